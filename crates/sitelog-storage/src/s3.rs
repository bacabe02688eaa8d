use crate::traits::{map_object_store_error, ObjectInfo, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{ClientOptions, ObjectStoreExt, PutPayload, Result as ObjectResult, RetryConfig};
use std::time::Duration;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `timeout` - Per-request timeout
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        // Credentials come from the standard AWS environment variables.
        Self::with_builder(AmazonS3Builder::from_env(), bucket, region, endpoint_url, timeout)
    }

    fn with_builder(
        builder: AmazonS3Builder,
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        // Every request is attempted once; ObjectStoreClient owns retries.
        let retry = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        let mut builder = builder
            .with_region(region)
            .with_bucket_name(bucket.clone())
            .with_retry(retry)
            .with_client_options(ClientOptions::new().with_timeout(timeout));

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let size = data.len() as u64;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;

        result.map_err(|e| {
            let err = map_object_store_error(e, key, true);
            tracing::error!(
                error = %err,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put failed"
            );
            err
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
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
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                let err = map_object_store_error(e, key, false);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(err);
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let location = Path::from(key.to_string());
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await;

        let url = url_result
            .map_err(|e| map_object_store_error(e, key, false))?
            .to_string();

        Ok(url)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DocumentLimits, ObjectStoreClient};
    use mockito::Matcher;
    use sitelog_core::{RetryPolicy, StoreError};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn storage(endpoint: String) -> S3Storage {
        let builder = AmazonS3Builder::new()
            .with_access_key_id("test-access-key")
            .with_secret_access_key("test-secret-key");
        S3Storage::with_builder(
            builder,
            "sitelog-documents".to_string(),
            "us-east-1".to_string(),
            Some(endpoint),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn policy(base_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay,
            factor: 2,
            max_delay: base_delay * 4,
        }
    }

    #[test]
    fn builds_against_custom_endpoint() {
        let storage = S3Storage::new(
            "sitelog-documents".to_string(),
            "eu-west-1".to_string(),
            Some("http://localhost:9000".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::S3);
        assert_eq!(storage.bucket, "sitelog-documents");
    }

    #[tokio::test]
    async fn server_error_on_put_is_sent_once_and_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Any)
            .with_status(503)
            .with_body("<Error><Code>SlowDown</Code></Error>")
            .expect(1)
            .create_async()
            .await;

        let err = storage(server.url())
            .put("proj-1/plan.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)), "{:?}", err);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bad_request_on_put_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("PUT", Matcher::Any)
            .with_status(400)
            .with_body("<Error><Code>InvalidArgument</Code></Error>")
            .create_async()
            .await;

        let err = storage(server.url())
            .put("proj-1/plan.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn upload_attempts_follow_the_client_policy() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = ObjectStoreClient::new(
            Arc::new(storage(server.url())),
            policy(Duration::from_millis(10)),
            DocumentLimits::default(),
        );
        let err = client
            .upload("proj-1", "plan.pdf", &b"%PDF"[..], "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { attempts: 3, .. }), "{:?}", err);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancellation_stops_upload_during_backoff() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let token = CancellationToken::new();
        let client = ObjectStoreClient::new(
            Arc::new(storage(server.url())),
            policy(Duration::from_secs(10)),
            DocumentLimits::default(),
        )
        .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });
        let started = std::time::Instant::now();
        let err = client
            .upload("proj-1", "plan.pdf", &b"%PDF"[..], "application/pdf")
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err, StoreError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        mock.assert_async().await;
    }
}
