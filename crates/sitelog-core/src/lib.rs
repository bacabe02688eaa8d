//! Sitelog Core Library
//!
//! This crate provides the domain models, error types, configuration and retry
//! policy shared by the activity log, object store and notification clients.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod retry;
pub mod storage_types;

// Re-export commonly used types
pub use config::{ActivityLogConfig, BaseConfig, Config, NotifyConfig, RetryConfig, StorageConfig};
pub use error::{ErrorMetadata, LogError, LogLevel, NotifyError, StoreError};
pub use models::{
    AccessGrant, ActivityAction, ActivityEvent, Channel, LogEntry, NotificationPayload,
    NotificationRequest, NotificationSeverity, Severity, StoredDocument,
};
pub use retry::{retry_with_policy, RetryError, RetryPolicy, Transient};
pub use storage_types::StorageBackend;
