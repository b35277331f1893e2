//! Error types for Drumie sessions and channels.

use thiserror::Error;

use crate::token::TokenError;

/// Errors surfaced by sessions and channels.
///
/// Connect and subscribe failures are delivered through lifecycle callback
/// contexts; the remaining variants are returned from API calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The token provider rejected or failed the request.
    #[error("Token fetch failed: {0}")]
    TokenFetchFailed(String),

    /// The transport could not be established or the server refused it.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The server refused a subscription.
    #[error("Subscribe to {channel} rejected ({code}): {message}")]
    SubscribeRejected {
        /// Channel name.
        channel: String,
        /// Server error code.
        code: u16,
        /// Server error message.
        message: String,
    },

    /// Publish attempted in a state that does not allow it.
    #[error("Publish to {channel} rejected: {reason}")]
    PublishRejected {
        /// Channel name.
        channel: String,
        /// Why the publish was refused.
        reason: &'static str,
    },

    /// A channel with this name is already registered.
    #[error("Channel already registered: {0}")]
    DuplicateChannel(String),

    /// No channel with this name (or handle) is registered.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Invalid channel name.
    #[error("Invalid channel name: {0}")]
    InvalidChannel(&'static str),

    /// The session driver has stopped.
    #[error("Session closed")]
    SessionClosed,
}

impl From<TokenError> for ClientError {
    fn from(err: TokenError) -> Self {
        Self::TokenFetchFailed(err.to_string())
    }
}

impl ClientError {
    /// Short label used for the `type` metric dimension.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokenFetchFailed(_) => "token_fetch_failed",
            Self::ConnectFailed(_) => "connect_failed",
            Self::SubscribeRejected { .. } => "subscribe_rejected",
            Self::PublishRejected { .. } => "publish_rejected",
            Self::DuplicateChannel(_) => "duplicate_channel",
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::InvalidChannel(_) => "invalid_channel",
            Self::SessionClosed => "session_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_conversion() {
        let err: ClientError = TokenError::Rejected("status 403".into()).into();
        assert!(matches!(err, ClientError::TokenFetchFailed(_)));
        assert_eq!(err.kind(), "token_fetch_failed");
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::SubscribeRejected {
            channel: "nice".into(),
            code: 1003,
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "Subscribe to nice rejected (1003): permission denied"
        );
    }
}
