#[cfg(feature = "storage-memory")]
use crate::MemoryStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use sitelog_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .storage
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.storage.s3_endpoint.clone();

            let storage = S3Storage::new(bucket, region, endpoint, config.http_timeout())?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => {
            let signing_key = config.storage.grant_signing_key.as_deref().ok_or_else(|| {
                StorageError::ConfigError("GRANT_SIGNING_KEY not configured".to_string())
            })?;
            let bucket = config
                .storage
                .s3_bucket
                .as_deref()
                .unwrap_or(&config.base.app_name);

            Ok(Arc::new(MemoryStorage::new(bucket, signing_key)))
        }

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => Err(StorageError::ConfigError(
            "Memory storage backend not available (storage-memory feature not enabled)"
                .to_string(),
        )),
    }
}
