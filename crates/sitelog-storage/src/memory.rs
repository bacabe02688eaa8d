use crate::signing::{GrantRejection, GrantSigner};
use crate::traits::{map_object_store_error, ObjectInfo, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Failure to inject into the next matching operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// Fail before touching the store
    Unavailable,
    /// Apply the write, then report an unknown outcome
    Ambiguous,
}

#[derive(Default)]
struct Faults {
    put: VecDeque<StorageFault>,
    delete: VecDeque<StorageFault>,
    head: VecDeque<StorageFault>,
    put_calls: u64,
    delete_calls: u64,
    head_calls: u64,
}

/// In-process object store
///
/// Backed by `object_store`'s in-memory implementation. Grants are HMAC-signed
/// URLs that can be redeemed with [`MemoryStorage::read_with_grant`], which
/// enforces expiry at access time. Faults can be queued per operation to
/// exercise the client's retry and ambiguity handling.
#[derive(Clone)]
pub struct MemoryStorage {
    store: Arc<InMemory>,
    signer: GrantSigner,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStorage {
    /// Create a new MemoryStorage instance
    ///
    /// # Arguments
    /// * `bucket` - Name used as the authority of grant URLs
    /// * `signing_key` - HMAC secret for grant URLs
    pub fn new(bucket: &str, signing_key: impl AsRef<[u8]>) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            signer: GrantSigner::new(bucket, signing_key),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_puts(&self, faults: impl IntoIterator<Item = StorageFault>) {
        self.faults().put.extend(faults);
    }

    pub fn fail_deletes(&self, faults: impl IntoIterator<Item = StorageFault>) {
        self.faults().delete.extend(faults);
    }

    pub fn fail_heads(&self, faults: impl IntoIterator<Item = StorageFault>) {
        self.faults().head.extend(faults);
    }

    /// Number of put calls received, including failed ones
    pub fn put_calls(&self) -> u64 {
        self.faults().put_calls
    }

    pub fn delete_calls(&self) -> u64 {
        self.faults().delete_calls
    }

    pub fn head_calls(&self) -> u64 {
        self.faults().head_calls
    }

    /// Read object bytes
    pub async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let location = Path::from(key.to_string());
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_object_store_error(e, key, false))?;
        result
            .bytes()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    /// Redeem a grant URL as an external client would
    pub async fn read_with_grant(&self, url: &str) -> StorageResult<Bytes> {
        self.read_with_grant_at(url, Utc::now()).await
    }

    /// Redeem a grant URL as of `now`
    pub async fn read_with_grant_at(&self, url: &str, now: DateTime<Utc>) -> StorageResult<Bytes> {
        let key = self.signer.verify(url, now).map_err(|e| match e {
            GrantRejection::Expired(at) => {
                StorageError::Rejected(format!("access grant expired at {}", at))
            }
            other => StorageError::Rejected(other.to_string()),
        })?;
        self.read(&key).await
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let fault = {
            let mut faults = self.faults();
            faults.put_calls += 1;
            faults.put.pop_front()
        };
        if fault == Some(StorageFault::Unavailable) {
            return Err(StorageError::Unavailable("injected put failure".to_string()));
        }

        let location = Path::from(key.to_string());
        self.store
            .put(&location, PutPayload::from(data))
            .await
            .map_err(|e| map_object_store_error(e, key, true))?;

        if fault == Some(StorageFault::Ambiguous) {
            return Err(StorageError::Ambiguous(
                "injected lost acknowledgement".to_string(),
            ));
        }
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let fault = {
            let mut faults = self.faults();
            faults.head_calls += 1;
            faults.head.pop_front()
        };
        if let Some(fault) = fault {
            return Err(match fault {
                StorageFault::Unavailable => {
                    StorageError::Unavailable("injected head failure".to_string())
                }
                StorageFault::Ambiguous => {
                    StorageError::Ambiguous("injected head failure".to_string())
                }
            });
        }

        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(meta) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size_bytes: meta.size as u64,
                last_modified: meta.last_modified,
            })),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_object_store_error(e, key, false)),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let fault = {
            let mut faults = self.faults();
            faults.delete_calls += 1;
            faults.delete.pop_front()
        };
        if fault == Some(StorageFault::Unavailable) {
            return Err(StorageError::Unavailable(
                "injected delete failure".to_string(),
            ));
        }

        let location = Path::from(key.to_string());
        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => return Err(map_object_store_error(e, key, false)),
        }

        if fault == Some(StorageFault::Ambiguous) {
            return Err(StorageError::Ambiguous(
                "injected lost acknowledgement".to_string(),
            ));
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let expires_at = chrono::Duration::from_std(expires_in)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                StorageError::Rejected(format!("grant lifetime out of range: {:?}", expires_in))
            })?;
        Ok(self.signer.sign(key, expires_at))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> MemoryStorage {
        MemoryStorage::new("documents", "0123456789abcdef0123456789abcdef")
    }

    #[tokio::test]
    async fn put_head_delete() {
        let storage = storage();
        storage
            .put("proj-1/a.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();

        let info = storage.head("proj-1/a.pdf").await.unwrap().unwrap();
        assert_eq!(info.size_bytes, 4);

        storage.delete("proj-1/a.pdf").await.unwrap();
        assert!(storage.head("proj-1/a.pdf").await.unwrap().is_none());
        storage.delete("proj-1/a.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn ambiguous_put_still_writes() {
        let storage = storage();
        storage.fail_puts([StorageFault::Ambiguous]);
        let err = storage
            .put("proj-1/a.pdf", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Ambiguous(_)));
        assert!(storage.head("proj-1/a.pdf").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn grants_are_checked_at_access_time() {
        let storage = storage();
        storage
            .put("proj-1/a.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();
        let url = storage
            .signed_url("proj-1/a.pdf", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            storage.read_with_grant(&url).await.unwrap(),
            Bytes::from_static(b"%PDF")
        );
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert!(matches!(
            storage.read_with_grant_at(&url, later).await,
            Err(StorageError::Rejected(_))
        ));
    }
}
