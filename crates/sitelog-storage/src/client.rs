use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use sitelog_activity::ActivityLogClient;
use sitelog_core::constants::{
    DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_GRANT_MAX_TTL_SECS, DEFAULT_MAX_DOCUMENT_SIZE_MB,
};
use sitelog_core::{
    retry_with_policy, AccessGrant, ActivityAction, ActivityEvent, Config, RetryError,
    RetryPolicy, Severity, StoreError, StoredDocument, Transient,
};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::keys;
use crate::traits::{Storage, StorageError};

/// Upload and grant limits enforced before any request reaches the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLimits {
    pub allowed_content_types: Vec<String>,
    pub max_size_bytes: usize,
    pub grant_max_ttl: Duration,
}

impl Default for DocumentLimits {
    fn default() -> Self {
        Self {
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_size_bytes: DEFAULT_MAX_DOCUMENT_SIZE_MB * 1024 * 1024,
            grant_max_ttl: Duration::from_secs(DEFAULT_GRANT_MAX_TTL_SECS),
        }
    }
}

impl DocumentLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_content_types: config.storage.allowed_content_types.clone(),
            max_size_bytes: config.storage.max_document_size_bytes,
            grant_max_ttl: config.grant_max_ttl(),
        }
    }

    fn allows_content_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_lowercase();
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
    }
}

/// Write failures as seen by the retry loop. Only failures where the store
/// certainly acknowledged nothing are worth another attempt.
struct WriteError(StorageError);

impl Transient for WriteError {
    fn is_transient(&self) -> bool {
        matches!(self.0, StorageError::Unavailable(_))
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.fmt(f)
    }
}

impl From<WriteError> for StorageError {
    fn from(err: WriteError) -> Self {
        err.0
    }
}

#[derive(Clone)]
struct Inner {
    storage: Arc<dyn Storage>,
    policy: RetryPolicy,
    limits: DocumentLimits,
    activity: Option<ActivityLogClient>,
}

/// Client for documents attached to records
///
/// Keys are derived from the owner record id and the sanitized filename, so the
/// calling application only ever persists `object_key`. Idempotent operations
/// (`delete`, `grant_access`) retry every transient failure; writes retry only
/// while the store has certainly not acknowledged anything.
#[derive(Clone)]
pub struct ObjectStoreClient {
    inner: Arc<Inner>,
    cancel: CancellationToken,
}

impl ObjectStoreClient {
    pub fn new(storage: Arc<dyn Storage>, policy: RetryPolicy, limits: DocumentLimits) -> Self {
        tracing::info!(
            backend = %storage.backend_type(),
            max_attempts = policy.max_attempts,
            grant_max_ttl_secs = limits.grant_max_ttl.as_secs(),
            "Object store client initialized"
        );

        Self {
            inner: Arc::new(Inner {
                storage,
                policy,
                limits,
                activity: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Record outcome events on `activity` (best effort, never awaited).
    pub fn with_activity_log(mut self, activity: ActivityLogClient) -> Self {
        Arc::make_mut(&mut self.inner).activity = Some(activity);
        self
    }

    /// Handle whose retry loops stop when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: token,
        }
    }

    pub fn limits(&self) -> &DocumentLimits {
        &self.inner.limits
    }

    /// Store a new document under `{owner_record_id}/{filename}`.
    pub async fn upload(
        &self,
        owner_record_id: &str,
        filename: &str,
        content: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<StoredDocument, StoreError> {
        let content = content.into();
        let key = keys::document_key(owner_record_id, filename)?;
        self.check_content(&content, content_type)?;

        let start = Instant::now();
        let size_bytes = content.len() as u64;
        if let Err(e) = self.write(&key, content, content_type).await {
            self.record_failure("upload", &key, &e);
            return Err(e);
        }

        let document = StoredDocument {
            object_key: key,
            owner_record_id: owner_record_id.trim().to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            uploaded_at: Utc::now(),
        };

        tracing::info!(
            key = %document.object_key,
            size_bytes = document.size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Document uploaded"
        );
        self.record_upload(&document);

        Ok(document)
    }

    /// Write `content` under a fresh revision key, then remove `existing_key`.
    ///
    /// The old key is deleted only after the new object is confirmed. If that
    /// delete fails the new document is still returned and the old object is
    /// reported as an orphan.
    pub async fn replace(
        &self,
        existing_key: &str,
        content: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<StoredDocument, StoreError> {
        let content = content.into();
        keys::validate_key(existing_key)?;
        let (owner, filename) = keys::parse_key(existing_key)?;
        self.check_content(&content, content_type)?;

        let start = Instant::now();
        let new_key = keys::revision_key(&owner, &filename);
        let size_bytes = content.len() as u64;
        if let Err(e) = self.write(&new_key, content, content_type).await {
            self.record_failure("replace", &new_key, &e);
            return Err(e);
        }

        let document = StoredDocument {
            object_key: new_key,
            owner_record_id: owner,
            content_type: content_type.to_string(),
            size_bytes,
            uploaded_at: Utc::now(),
        };
        self.record_upload(&document);

        if let Err(e) = self.delete_object(existing_key).await {
            tracing::warn!(
                error = %e,
                orphaned_key = %existing_key,
                new_key = %document.object_key,
                "Replaced document left an orphaned object"
            );
            self.record_event(|actor| {
                ActivityEvent::new(actor, ActivityAction::Error)
                    .with_target(existing_key)
                    .with_severity(Severity::Warning)
                    .with_detail(format!(
                        "orphaned object after replace: new_key={} error={}",
                        document.object_key, e
                    ))
            });
        }

        tracing::info!(
            old_key = %existing_key,
            key = %document.object_key,
            size_bytes = document.size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Document replaced"
        );

        Ok(document)
    }

    /// Delete `key`. Deleting a key that does not exist succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        keys::validate_key(key)?;
        match self.delete_object(key).await {
            Ok(()) => {
                tracing::info!(key = %key, "Document deleted");
                self.record_event(|actor| {
                    ActivityEvent::new(actor, ActivityAction::DocumentDeleted).with_target(key)
                });
                Ok(())
            }
            Err(e) => {
                self.record_failure("delete", key, &e);
                Err(e)
            }
        }
    }

    /// Issue a signed, time-limited read reference for an existing object.
    ///
    /// `ttl` is clamped to the configured maximum. Fails with `NotFound` if the
    /// key does not exist right now.
    pub async fn grant_access(&self, key: &str, ttl: Duration) -> Result<AccessGrant, StoreError> {
        keys::validate_key(key)?;
        if ttl.is_zero() {
            return Err(StoreError::InvalidInput(
                "grant ttl must be greater than zero".to_string(),
            ));
        }

        let max_ttl = self.inner.limits.grant_max_ttl;
        let ttl = if ttl > max_ttl {
            tracing::debug!(
                key = %key,
                requested_secs = ttl.as_secs(),
                max_secs = max_ttl.as_secs(),
                "Clamping grant ttl"
            );
            max_ttl
        } else {
            ttl
        };

        let storage = &self.inner.storage;
        let head = retry_with_policy(&self.inner.policy, &self.cancel, "object_store.head", |_| {
            storage.head(key)
        })
        .await
        .map_err(map_retry_error)?;
        if head.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }

        // Whole seconds keep `expires_at` at or before the signed expiry.
        let issued_at = Utc::now().trunc_subsecs(0);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| StoreError::InvalidInput(format!("grant ttl out of range: {:?}", ttl)))?;
        let url = retry_with_policy(&self.inner.policy, &self.cancel, "object_store.sign", |_| {
            storage.signed_url(key, ttl)
        })
        .await
        .map_err(map_retry_error)?;
        let grant = AccessGrant {
            object_key: key.to_string(),
            url,
            issued_at,
            expires_at,
        };

        tracing::info!(
            key = %key,
            ttl_secs = ttl.as_secs(),
            expires_at = %grant.expires_at,
            "Access granted"
        );
        self.record_event(|actor| {
            ActivityEvent::new(actor, ActivityAction::AccessGranted)
                .with_target(key)
                .with_detail(format!("ttl_secs={}", ttl.as_secs()))
        });

        Ok(grant)
    }

    fn check_content(&self, content: &Bytes, content_type: &str) -> Result<(), StoreError> {
        let limits = &self.inner.limits;
        if content.is_empty() {
            return Err(StoreError::InvalidInput("content is empty".to_string()));
        }
        if content.len() > limits.max_size_bytes {
            return Err(StoreError::InvalidInput(format!(
                "content is {} bytes, limit is {}",
                content.len(),
                limits.max_size_bytes
            )));
        }
        if !limits.allows_content_type(content_type) {
            return Err(StoreError::InvalidInput(format!(
                "content type '{}' is not allowed",
                content_type
            )));
        }
        Ok(())
    }

    async fn write(&self, key: &str, content: Bytes, content_type: &str) -> Result<(), StoreError> {
        let storage = &self.inner.storage;
        retry_with_policy(&self.inner.policy, &self.cancel, "object_store.put", |_| {
            let content = content.clone();
            async move { storage.put(key, content, content_type).await.map_err(WriteError) }
        })
        .await
        .map_err(map_retry_error)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let storage = &self.inner.storage;
        let result = retry_with_policy(&self.inner.policy, &self.cancel, "object_store.delete", |_| {
            storage.delete(key)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Permanent {
                error: StorageError::NotFound(_),
                ..
            }) => Ok(()),
            Err(e) => Err(map_retry_error(e)),
        }
    }

    fn record_upload(&self, document: &StoredDocument) {
        self.record_event(|actor| {
            ActivityEvent::new(actor, ActivityAction::Upload)
                .with_target(document.owner_record_id.as_str())
                .with_detail(format!(
                    "key={} content_type={} size_bytes={}",
                    document.object_key, document.content_type, document.size_bytes
                ))
        });
    }

    fn record_failure(&self, operation: &str, key: &str, error: &StoreError) {
        if matches!(error, StoreError::Cancelled) {
            return;
        }
        self.record_event(|actor| {
            ActivityEvent::new(actor, ActivityAction::Error)
                .with_target(key)
                .with_detail(format!("{} failed: {}", operation, error))
        });
    }

    fn record_event(&self, build: impl FnOnce(&str) -> ActivityEvent) {
        if let Some(activity) = &self.inner.activity {
            activity.record_detached(build(activity.service_actor()));
        }
    }
}

fn map_retry_error<E: Into<StorageError>>(err: RetryError<E>) -> StoreError {
    match err {
        RetryError::Exhausted { attempts, last } => StoreError::Unavailable {
            attempts,
            message: last.into().to_string(),
        },
        RetryError::Permanent { attempt, error } => match error.into() {
            StorageError::NotFound(key) => StoreError::NotFound(key),
            StorageError::Ambiguous(message) => StoreError::Ambiguous(message),
            StorageError::Unavailable(message) => StoreError::Unavailable {
                attempts: attempt,
                message,
            },
            StorageError::Rejected(message) | StorageError::ConfigError(message) => {
                StoreError::Backend(message)
            }
        },
        RetryError::Cancelled { .. } => StoreError::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStorage, StorageFault};
    use sitelog_activity::MemorySink;

    const PDF: &[u8] = b"%PDF-1.7 site plan";

    fn setup() -> (MemoryStorage, ObjectStoreClient) {
        let storage = MemoryStorage::new("documents", "0123456789abcdef0123456789abcdef");
        let client = ObjectStoreClient::new(
            Arc::new(storage.clone()),
            RetryPolicy::default(),
            DocumentLimits::default(),
        );
        (storage, client)
    }

    async fn wait_for(sink: &MemorySink, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("activity events recorded");
    }

    #[tokio::test]
    async fn upload_derives_owner_scoped_key() {
        let (storage, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();

        assert_eq!(doc.object_key, "proj-42/plan.pdf");
        assert_eq!(doc.size_bytes, PDF.len() as u64);
        assert_eq!(doc.owner_record_id, "proj-42");
        assert_eq!(storage.read(&doc.object_key).await.unwrap(), Bytes::from_static(PDF));
    }

    #[tokio::test]
    async fn upload_rejects_invalid_input_without_writing() {
        let (storage, client) = setup();

        for result in [
            client.upload("proj-42", "plan.pdf", Bytes::new(), "application/pdf").await,
            client.upload("proj-42", "plan.exe", PDF, "application/x-msdownload").await,
            client.upload("", "plan.pdf", PDF, "application/pdf").await,
            client.upload("proj-42", "...", PDF, "application/pdf").await,
        ] {
            assert!(matches!(result, Err(StoreError::InvalidInput(_))));
        }
        assert_eq!(storage.put_calls(), 0);
    }

    #[tokio::test]
    async fn oversize_content_is_rejected() {
        let storage = MemoryStorage::new("documents", "0123456789abcdef0123456789abcdef");
        let limits = DocumentLimits {
            max_size_bytes: 4,
            ..DocumentLimits::default()
        };
        let client = ObjectStoreClient::new(Arc::new(storage), RetryPolicy::default(), limits);
        let err = client
            .upload("proj-42", "notes.txt", "hello", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn content_type_parameters_are_ignored() {
        let (_, client) = setup();
        client
            .upload("proj-42", "notes.txt", "hello", "Text/Plain; charset=utf-8")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_then_grant_succeeds() {
        let (storage, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        let grant = client
            .grant_access(&doc.object_key, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(grant.object_key, "proj-42/plan.pdf");
        assert_eq!(grant.expires_at - grant.issued_at, chrono::Duration::seconds(600));
        assert_eq!(
            storage.read_with_grant(&grant.url).await.unwrap(),
            Bytes::from_static(PDF)
        );
    }

    #[tokio::test]
    async fn expired_grants_are_refused_but_new_grants_work() {
        let (storage, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        let grant = client
            .grant_access(&doc.object_key, Duration::from_secs(600))
            .await
            .unwrap();

        let after_expiry = grant.expires_at + chrono::Duration::seconds(1);
        assert!(matches!(
            storage.read_with_grant_at(&grant.url, after_expiry).await,
            Err(StorageError::Rejected(_))
        ));

        // Expiry never removes the object
        let fresh = client
            .grant_access(&doc.object_key, Duration::from_secs(600))
            .await
            .unwrap();
        assert!(storage.read_with_grant(&fresh.url).await.is_ok());
    }

    #[tokio::test]
    async fn grant_ttl_is_clamped_and_must_be_positive() {
        let (_, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();

        let grant = client
            .grant_access(&doc.object_key, Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(grant.ttl(), chrono::Duration::seconds(3600));

        let err = client
            .grant_access(&doc.object_key, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn out_of_range_grant_ttl_is_invalid_input() {
        let storage = MemoryStorage::new("documents", "0123456789abcdef0123456789abcdef");
        let client = ObjectStoreClient::new(
            Arc::new(storage),
            RetryPolicy::default(),
            DocumentLimits {
                grant_max_ttl: Duration::from_secs(u64::MAX),
                ..DocumentLimits::default()
            },
        );
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        let err = client
            .grant_access(&doc.object_key, Duration::from_secs(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn grant_for_missing_key_is_not_found() {
        let (_, client) = setup();
        let err = client
            .grant_access("proj-42/missing.pdf", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("proj-42/missing.pdf".to_string()));
    }

    #[tokio::test]
    async fn replace_writes_new_key_then_removes_old() {
        let (_, client) = setup();
        let old = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        let new = client
            .replace(&old.object_key, &b"%PDF-1.7 revised"[..], "application/pdf")
            .await
            .unwrap();

        assert_ne!(new.object_key, old.object_key);
        assert!(new.object_key.starts_with("proj-42/plan~"));
        client
            .grant_access(&new.object_key, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(matches!(
            client.grant_access(&old.object_key, Duration::from_secs(60)).await,
            Err(StoreError::NotFound(_))
        ));

        // A second replace starts from the revision key
        let newest = client
            .replace(&new.object_key, PDF, "application/pdf")
            .await
            .unwrap();
        assert!(newest.object_key.starts_with("proj-42/plan~"));
        assert_ne!(newest.object_key, new.object_key);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_old_delete_still_succeeds_and_logs_orphan() {
        let (storage, client) = setup();
        let sink = MemorySink::new();
        let activity =
            ActivityLogClient::new(Arc::new(sink.clone()), "sitelog", RetryPolicy::default());
        let client = client.with_activity_log(activity);

        let old = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        storage.fail_deletes([StorageFault::Unavailable; 3]);
        let new = client
            .replace(&old.object_key, PDF, "application/pdf")
            .await
            .unwrap();

        // Old object is still readable
        client
            .grant_access(&old.object_key, Duration::from_secs(60))
            .await
            .unwrap();
        client
            .grant_access(&new.object_key, Duration::from_secs(60))
            .await
            .unwrap();

        wait_for(&sink, 5).await;
        let orphan = sink
            .entries()
            .into_iter()
            .find(|e| e.event.action == ActivityAction::Error)
            .expect("orphan event");
        assert_eq!(orphan.event.severity, Severity::Warning);
        assert_eq!(orphan.event.target_id.as_deref(), Some("proj-42/plan.pdf"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        client.delete(&doc.object_key).await.unwrap();
        client.delete(&doc.object_key).await.unwrap();
        client.delete("proj-42/never-existed.pdf").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn delete_retries_transient_failures() {
        let (storage, client) = setup();
        storage.fail_deletes([StorageFault::Unavailable, StorageFault::Ambiguous]);
        client.delete("proj-42/plan.pdf").await.unwrap();
        assert_eq!(storage.delete_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn grant_retries_transient_existence_checks() {
        let (storage, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();

        storage.fail_heads([StorageFault::Unavailable, StorageFault::Ambiguous]);
        let grant = client
            .grant_access(&doc.object_key, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(storage.head_calls(), 3);
        assert_eq!(
            storage.read_with_grant(&grant.url).await.unwrap(),
            Bytes::from_static(PDF)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn grant_surfaces_unavailable_when_existence_is_unknown() {
        let (storage, client) = setup();
        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();

        storage.fail_heads([StorageFault::Unavailable; 3]);
        let err = client
            .grant_access(&doc.object_key, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { attempts: 3, .. }), "{:?}", err);
        assert_eq!(storage.head_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_retries_unacknowledged_writes() {
        let (storage, client) = setup();
        storage.fail_puts([StorageFault::Unavailable, StorageFault::Unavailable]);
        client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        assert_eq!(storage.put_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_surfaces_unavailable_after_exhausting_retries() {
        let (storage, client) = setup();
        storage.fail_puts([StorageFault::Unavailable; 5]);
        let err = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { attempts: 3, .. }));
        assert_eq!(storage.put_calls(), 3);
    }

    #[tokio::test]
    async fn ambiguous_write_is_not_retried() {
        let (storage, client) = setup();
        storage.fail_puts([StorageFault::Ambiguous]);
        let err = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ambiguous(_)));
        assert_eq!(storage.put_calls(), 1);
    }

    #[tokio::test]
    async fn ambiguous_replace_keeps_old_key() {
        let (storage, client) = setup();
        let old = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        storage.fail_puts([StorageFault::Ambiguous]);
        let err = client
            .replace(&old.object_key, PDF, "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Ambiguous(_)));
        assert_eq!(storage.delete_calls(), 0);
        assert!(storage.read(&old.object_key).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_client_does_not_write() {
        let (storage, client) = setup();
        let token = CancellationToken::new();
        token.cancel();
        let err = client
            .with_cancellation(token)
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Cancelled);
        assert_eq!(storage.put_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let (storage, client) = setup();
        storage.fail_puts([StorageFault::Unavailable; 5]);
        let token = CancellationToken::new();
        let client = client.with_cancellation(token.clone());

        let call = tokio::spawn(async move {
            client
                .upload("proj-42", "plan.pdf", PDF, "application/pdf")
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, StoreError::Cancelled);
        assert_eq!(storage.put_calls(), 1);
    }

    #[tokio::test]
    async fn outcome_events_are_recorded() {
        let (_, client) = setup();
        let sink = MemorySink::new();
        let activity =
            ActivityLogClient::new(Arc::new(sink.clone()), "sitelog", RetryPolicy::default());
        let client = client.with_activity_log(activity);

        let doc = client
            .upload("proj-42", "plan.pdf", PDF, "application/pdf")
            .await
            .unwrap();
        client
            .grant_access(&doc.object_key, Duration::from_secs(60))
            .await
            .unwrap();
        client.delete(&doc.object_key).await.unwrap();

        wait_for(&sink, 3).await;
        let mut actions: Vec<ActivityAction> =
            sink.entries().iter().map(|e| e.event.action).collect();
        actions.sort_by_key(|a| a.as_str());
        assert_eq!(
            actions,
            vec![
                ActivityAction::AccessGranted,
                ActivityAction::DocumentDeleted,
                ActivityAction::Upload,
            ]
        );
    }
}
