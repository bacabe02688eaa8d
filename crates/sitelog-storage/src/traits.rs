//! Storage abstraction trait
//!
//! This module defines the Storage trait that all object store backends must
//! implement, and the error classification the client's retry logic relies on.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sitelog_core::Transient;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The request never reached the store; nothing was written.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The request may have been applied; the outcome is unknown.
    #[error("Storage outcome unknown: {0}")]
    Ambiguous(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage backend rejected request: {0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Idempotent operations (head, delete, signing) may be repeated after any
/// network-level failure.
impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Ambiguous(_))
    }
}

/// Classify an `object_store` failure for `key`.
///
/// Error responses and connect failures mean the store did not apply the
/// request. A write that timed out or lost its connection after the request
/// went out is `Ambiguous`.
pub(crate) fn map_object_store_error(
    err: object_store::Error,
    key: &str,
    is_write: bool,
) -> StorageError {
    use object_store::Error as ObjectStoreError;

    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        ObjectStoreError::PermissionDenied { .. }
        | ObjectStoreError::Unauthenticated { .. }
        | ObjectStoreError::Precondition { .. }
        | ObjectStoreError::AlreadyExists { .. }
        | ObjectStoreError::NotSupported { .. } => StorageError::Rejected(err.to_string()),
        ObjectStoreError::Generic { ref source, .. } => {
            match classify_transport(&**source) {
                Some(Outcome::NotApplied) => StorageError::Unavailable(err.to_string()),
                Some(Outcome::Refused) => StorageError::Rejected(err.to_string()),
                Some(Outcome::Unknown) | None if is_write => {
                    StorageError::Ambiguous(err.to_string())
                }
                _ => StorageError::Unavailable(err.to_string()),
            }
        }
        other if is_write => StorageError::Ambiguous(other.to_string()),
        other => StorageError::Unavailable(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The store answered with a retryable error or was never reached
    NotApplied,
    /// The store answered with a non-retryable error
    Refused,
    /// The request may have reached the store
    Unknown,
}

/// Walk the source chain of a generic `object_store` error.
fn classify_transport(error: &(dyn std::error::Error + 'static)) -> Option<Outcome> {
    use object_store::client::{HttpError, HttpErrorKind};

    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<HttpError>() {
            return Some(match http.kind() {
                HttpErrorKind::Connect | HttpErrorKind::Request => Outcome::NotApplied,
                _ => Outcome::Unknown,
            });
        }
        if let Some(status) = response_status(e) {
            return Some(match status {
                408 | 429 | 500..=599 => Outcome::NotApplied,
                _ => Outcome::Refused,
            });
        }
        current = e.source();
    }
    None
}

/// Status code of an error response. `object_store` keeps its request error
/// type private, so the code is read from the rendered message.
fn response_status(error: &(dyn std::error::Error + 'static)) -> Option<u16> {
    let message = error.to_string();
    let (_, rest) = message.split_once("status code: ")?;
    rest.get(..3)?.parse().ok()
}

/// Object metadata returned by [`Storage::head`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Storage abstraction trait
///
/// Backends classify failures: a write that certainly did not land is
/// `Unavailable`; a write whose outcome is unknown (timeout after the body was
/// sent, connection reset mid-response) is `Ambiguous`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `key`, replacing any existing object
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Object metadata, or `None` if the key does not exist
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>>;

    /// Delete an object. Deleting a missing key succeeds or returns `NotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Generate a signed, time-limited GET reference for direct client access
    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
