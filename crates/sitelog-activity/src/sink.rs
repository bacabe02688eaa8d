//! Log sink abstraction
//!
//! A sink appends [`LogEntry`] values to a remote, append-only stream. Sinks
//! must treat `entry_id` as an idempotency key: appending the same entry twice
//! (a retry after a lost acknowledgement) must leave one record.

use async_trait::async_trait;
use sitelog_core::{LogEntry, Transient};
use thiserror::Error;

/// Sink operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Network failure, timeout, throttling or server error. Safe to retry.
    #[error("Log sink unavailable: {0}")]
    Unavailable(String),

    /// The sink refused the entry. Retrying will not help.
    #[error("Log sink rejected entry: {0}")]
    Rejected(String),

    #[error("Log sink configuration error: {0}")]
    Config(String),
}

impl Transient for SinkError {
    fn is_transient(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one entry to its stream
    async fn append(&self, entry: &LogEntry) -> Result<(), SinkError>;

    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;
}
