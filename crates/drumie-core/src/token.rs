//! Token provider contracts.
//!
//! Sessions fetch a fresh connection token for every connect attempt and
//! channels fetch a fresh subscription token for every subscribe attempt.
//! Tokens are never cached across attempts.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// An opaque, short-lived credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Token provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The issuer refused the request.
    #[error("Token request rejected: {0}")]
    Rejected(String),

    /// The issuer answered with something that is not a token.
    #[error("Malformed token response: {0}")]
    Malformed(String),

    /// The issuer could not be reached.
    #[error("Token issuer unavailable: {0}")]
    Unavailable(String),
}

/// Input to a subscription token request.
#[derive(Debug, Clone)]
pub struct SubscribeTokenRequest {
    /// The connection token of the current connection attempt.
    pub connection_token: Token,
    /// The channel being subscribed.
    pub channel: String,
}

/// Supplies connection tokens.
#[async_trait]
pub trait ConnectTokenProvider: Send + Sync {
    /// Fetch a fresh connection token.
    async fn connect_token(&self) -> Result<Token, TokenError>;
}

/// Supplies per-channel subscription tokens.
#[async_trait]
pub trait SubscribeTokenProvider: Send + Sync {
    /// Fetch a fresh subscription token for `request.channel`.
    async fn subscribe_token(&self, request: SubscribeTokenRequest) -> Result<Token, TokenError>;
}

/// A [`ConnectTokenProvider`] backed by a closure.
pub struct ConnectTokenFn<F>(F);

/// Adapt an async closure into a [`ConnectTokenProvider`].
pub fn connect_token_fn<F, Fut>(f: F) -> ConnectTokenFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send + 'static,
{
    ConnectTokenFn(f)
}

#[async_trait]
impl<F, Fut> ConnectTokenProvider for ConnectTokenFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send + 'static,
{
    async fn connect_token(&self) -> Result<Token, TokenError> {
        (self.0)().await
    }
}

/// A [`SubscribeTokenProvider`] backed by a closure.
pub struct SubscribeTokenFn<F>(F);

/// Adapt an async closure into a [`SubscribeTokenProvider`].
pub fn subscribe_token_fn<F, Fut>(f: F) -> SubscribeTokenFn<F>
where
    F: Fn(SubscribeTokenRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send + 'static,
{
    SubscribeTokenFn(f)
}

#[async_trait]
impl<F, Fut> SubscribeTokenProvider for SubscribeTokenFn<F>
where
    F: Fn(SubscribeTokenRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Token, TokenError>> + Send + 'static,
{
    async fn subscribe_token(&self, request: SubscribeTokenRequest) -> Result<Token, TokenError> {
        (self.0)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("TOK1");
        assert_eq!(format!("{:?}", token), "Token(***)");
        assert_eq!(token.as_str(), "TOK1");
    }

    #[tokio::test]
    async fn test_closure_providers() {
        let connect = connect_token_fn(|| async { Ok::<_, TokenError>(Token::new("TOK1")) });
        let token = connect.connect_token().await.unwrap();

        let subscribe = subscribe_token_fn(|req: SubscribeTokenRequest| async move {
            if req.connection_token.as_str() == "TOK1" {
                Ok(Token::new(format!("S-{}", req.channel)))
            } else {
                Err(TokenError::Rejected("unknown connection".into()))
            }
        });

        let stok = subscribe
            .subscribe_token(SubscribeTokenRequest {
                connection_token: token,
                channel: "customer".into(),
            })
            .await
            .unwrap();
        assert_eq!(stok.as_str(), "S-customer");

        let rejected = subscribe
            .subscribe_token(SubscribeTokenRequest {
                connection_token: Token::new("TOK2"),
                channel: "customer".into(),
            })
            .await;
        assert!(matches!(rejected, Err(TokenError::Rejected(_))));
    }
}
