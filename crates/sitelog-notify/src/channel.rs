//! Notification channel abstraction

use async_trait::async_trait;
use sitelog_core::{Channel, NotificationRequest, Transient};
use thiserror::Error;

/// Delivery errors reported by a channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Nothing was delivered; another attempt may succeed.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The request went out but no answer came back; the message may have
    /// been delivered.
    #[error("Delivery outcome unknown: {0}")]
    Ambiguous(String),

    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("Channel configuration error: {0}")]
    Config(String),
}

impl Transient for ChannelError {
    fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Unavailable(_))
    }
}

/// One outbound delivery mechanism
///
/// `send` delivers exactly one message on success. It must only report
/// `Unavailable` when no message went out, since that error is retried.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> Result<(), ChannelError>;

    fn channel(&self) -> Channel;
}
