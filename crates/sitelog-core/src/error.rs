//! Error types module
//!
//! Each integration client has its own error enum so callers can match on the
//! failure modes that matter for that component:
//!
//! - [`LogError`] for the activity log client
//! - [`StoreError`] for the object store client
//! - [`NotifyError`] for the notification dispatcher
//!
//! All three implement [`ErrorMetadata`], which tells callers whether a failure
//! is worth retrying later and at which level it should be logged.

use crate::models::Channel;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like unavailable endpoints
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be treated by the calling workflow
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "LOG_SINK_UNAVAILABLE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (the operation may succeed later)
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Activity log failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("Invalid activity event: {0}")]
    InvalidEvent(String),

    #[error("Log sink unavailable after {attempts} attempt(s): {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("Activity logging cancelled")]
    Cancelled,
}

/// Object store failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store unavailable after {attempts} attempt(s): {message}")]
    Unavailable { attempts: u32, message: String },

    /// The write may or may not have landed. Never retried automatically.
    #[error("Write outcome unknown: {0}")]
    Ambiguous(String),

    #[error("Object store rejected the request: {0}")]
    Backend(String),

    #[error("Object store operation cancelled")]
    Cancelled,
}

/// Notification dispatch failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid notification request: {0}")]
    InvalidRequest(String),

    #[error("Notification channel unavailable: {0}")]
    ChannelUnavailable(Channel),

    #[error("Notification dispatch cancelled")]
    Cancelled,
}

impl ErrorMetadata for LogError {
    fn error_code(&self) -> &'static str {
        match self {
            LogError::InvalidEvent(_) => "INVALID_EVENT",
            LogError::Unavailable { .. } => "LOG_SINK_UNAVAILABLE",
            LogError::Cancelled => "CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, LogError::Unavailable { .. })
    }

    fn log_level(&self) -> LogLevel {
        match self {
            LogError::InvalidEvent(_) => LogLevel::Error,
            LogError::Unavailable { .. } => LogLevel::Warn,
            LogError::Cancelled => LogLevel::Debug,
        }
    }
}

/// Static metadata for each variant: (error_code, recoverable, log_level).
fn store_error_static_metadata(err: &StoreError) -> (&'static str, bool, LogLevel) {
    match err {
        StoreError::InvalidInput(_) => ("INVALID_INPUT", false, LogLevel::Debug),
        StoreError::NotFound(_) => ("NOT_FOUND", false, LogLevel::Debug),
        StoreError::Unavailable { .. } => ("STORE_UNAVAILABLE", true, LogLevel::Warn),
        StoreError::Ambiguous(_) => ("WRITE_OUTCOME_UNKNOWN", false, LogLevel::Error),
        StoreError::Backend(_) => ("STORE_REJECTED", false, LogLevel::Error),
        StoreError::Cancelled => ("CANCELLED", false, LogLevel::Debug),
    }
}

impl ErrorMetadata for StoreError {
    fn error_code(&self) -> &'static str {
        store_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        store_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        store_error_static_metadata(self).2
    }
}

impl ErrorMetadata for NotifyError {
    fn error_code(&self) -> &'static str {
        match self {
            NotifyError::InvalidRequest(_) => "INVALID_REQUEST",
            NotifyError::ChannelUnavailable(_) => "CHANNEL_UNAVAILABLE",
            NotifyError::Cancelled => "CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, NotifyError::ChannelUnavailable(_))
    }

    fn log_level(&self) -> LogLevel {
        match self {
            NotifyError::InvalidRequest(_) => LogLevel::Debug,
            NotifyError::ChannelUnavailable(_) => LogLevel::Warn,
            NotifyError::Cancelled => LogLevel::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_error_metadata() {
        let err = LogError::Unavailable {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.error_code(), "LOG_SINK_UNAVAILABLE");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Warn);
        assert!(err.to_string().contains("3 attempt(s)"));

        let err = LogError::InvalidEvent("unknown action".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "INVALID_EVENT");
    }

    #[test]
    fn test_store_error_ambiguous_is_not_recoverable() {
        let err = StoreError::Ambiguous("timeout after send".to_string());
        assert_eq!(err.error_code(), "WRITE_OUTCOME_UNKNOWN");
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_notify_error_names_channel() {
        let err = NotifyError::ChannelUnavailable(Channel::Push);
        assert_eq!(err.to_string(), "Notification channel unavailable: push");
        assert!(err.is_recoverable());
    }
}
