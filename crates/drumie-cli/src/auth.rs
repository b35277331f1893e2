//! HTTP token issuer client.
//!
//! The issuer is an external service. Connection tokens are requested with
//! `POST {id, name, channels}`, where `channels` is a filter string such as
//! `"*"` or `"customer nice"`. Subscription tokens are requested with
//! `POST {token, channel}`. Both answer `{"token": "..."}`.

use async_trait::async_trait;
use drumie_core::{
    ConnectTokenProvider, SubscribeTokenProvider, SubscribeTokenRequest, Token, TokenError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AuthConfig;

#[derive(Debug, Serialize)]
struct ConnectTokenBody<'a> {
    id: &'a str,
    name: &'a str,
    channels: &'a str,
}

#[derive(Debug, Serialize)]
struct SubscribeTokenBody<'a> {
    token: &'a str,
    channel: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

struct Inner {
    client: reqwest::Client,
    connect_url: String,
    subscribe_url: String,
    client_id: String,
    client_name: String,
    channels: String,
}

/// Fetches connection and subscription tokens over HTTP.
#[derive(Clone)]
pub struct HttpTokenIssuer {
    inner: Arc<Inner>,
}

impl HttpTokenIssuer {
    /// Create an issuer client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(auth: &AuthConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(auth.timeout_ms))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                connect_url: auth.connect_url.clone(),
                subscribe_url: auth.subscribe_url.clone(),
                client_id: auth.client_id.clone(),
                client_name: auth.client_name.clone(),
                channels: auth.channels.clone(),
            }),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Token, TokenError> {
        let response = self
            .inner
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Token issuer unreachable");
                TokenError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(url = %url, %status, "Token request rejected");
            return Err(TokenError::Rejected(format!("{status}: {detail}")));
        }

        let TokenResponse { token } = response
            .json()
            .await
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        debug!(url = %url, "Token issued");
        Ok(Token::new(token))
    }
}

#[async_trait]
impl ConnectTokenProvider for HttpTokenIssuer {
    async fn connect_token(&self) -> Result<Token, TokenError> {
        let body = ConnectTokenBody {
            id: &self.inner.client_id,
            name: &self.inner.client_name,
            channels: &self.inner.channels,
        };
        self.post(&self.inner.connect_url, &body).await
    }
}

#[async_trait]
impl SubscribeTokenProvider for HttpTokenIssuer {
    async fn subscribe_token(&self, request: SubscribeTokenRequest) -> Result<Token, TokenError> {
        let body = SubscribeTokenBody {
            token: request.connection_token.as_str(),
            channel: &request.channel,
        };
        self.post(&self.inner.subscribe_url, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn connect(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["id"], "john");
        assert_eq!(body["name"], "John Doe");
        assert_eq!(body["channels"], "*");
        Json(json!({"token": "TOK1"}))
    }

    async fn subscribe(Json(body): Json<Value>) -> Json<Value> {
        let token = body["token"].as_str().unwrap_or_default();
        Json(json!({"token": format!("S{token}"), "channel": body["channel"]}))
    }

    async fn echo_filter(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({"token": body["channels"]}))
    }

    async fn denied() -> (StatusCode, &'static str) {
        (StatusCode::FORBIDDEN, "expired")
    }

    async fn garbled() -> &'static str {
        "not json"
    }

    async fn issuer_at(path_connect: &str, path_subscribe: &str) -> HttpTokenIssuer {
        issuer_with(path_connect, path_subscribe, AuthConfig::default()).await
    }

    async fn issuer_with(
        path_connect: &str,
        path_subscribe: &str,
        auth: AuthConfig,
    ) -> HttpTokenIssuer {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/api/connect-token", post(connect))
            .route("/api/subscribe-token", post(subscribe))
            .route("/api/filter", post(echo_filter))
            .route("/api/denied", post(denied))
            .route("/api/garbled", post(garbled));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let auth = AuthConfig {
            connect_url: format!("http://{addr}{path_connect}"),
            subscribe_url: format!("http://{addr}{path_subscribe}"),
            ..auth
        };
        HttpTokenIssuer::new(&auth).unwrap()
    }

    #[tokio::test]
    async fn test_issues_tokens() {
        let issuer = issuer_at("/api/connect-token", "/api/subscribe-token").await;

        let token = issuer.connect_token().await.unwrap();
        assert_eq!(token.as_str(), "TOK1");

        let request = SubscribeTokenRequest {
            connection_token: token,
            channel: "customer".into(),
        };
        assert_eq!(issuer.subscribe_token(request).await.unwrap().as_str(), "STOK1");
    }

    #[tokio::test]
    async fn test_channel_filter_sent_as_string() {
        let auth = AuthConfig {
            channels: "customer nice".to_string(),
            ..AuthConfig::default()
        };
        let issuer = issuer_with("/api/filter", "/api/subscribe-token", auth).await;

        let token = issuer.connect_token().await.unwrap();
        assert_eq!(token.as_str(), "customer nice");
    }

    #[tokio::test]
    async fn test_rejected_and_malformed() {
        let issuer = issuer_at("/api/denied", "/api/garbled").await;

        assert!(matches!(
            issuer.connect_token().await,
            Err(TokenError::Rejected(reason)) if reason.contains("403")
        ));

        let request = SubscribeTokenRequest {
            connection_token: Token::new("TOK1"),
            channel: "customer".into(),
        };
        assert!(matches!(
            issuer.subscribe_token(request).await,
            Err(TokenError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_issuer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let auth = AuthConfig {
            connect_url: format!("http://{addr}/api/connect-token"),
            ..AuthConfig::default()
        };
        let issuer = HttpTokenIssuer::new(&auth).unwrap();
        assert!(matches!(
            issuer.connect_token().await,
            Err(TokenError::Unavailable(_))
        ));
    }
}
