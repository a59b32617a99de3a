use std::time::Duration;

use async_trait::async_trait;
use herald_types::models::MessageFormat;
use thiserror::Error;

/// Why a single delivery failed. Never escalated past the broadcast
/// dispatcher; it only counts against one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Recipient blocked the bot")]
    Blocked,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("API error (status {status}): {description}")]
    Api { status: u16, description: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL embeds the bot token.
        let err = err.without_url();
        if err.is_decode() {
            SendError::Decode(err.to_string())
        } else {
            SendError::Network(err.to_string())
        }
    }
}

/// Platform delivery primitive the broadcast dispatcher fans out through.
///
/// Implementations must tolerate many concurrent calls from one job.
#[async_trait]
pub trait SendCapability: Send + Sync {
    async fn send(
        &self,
        recipient: i64,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), SendError>;
}
