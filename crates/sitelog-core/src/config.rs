//! Configuration module
//!
//! Configuration is read once at startup from environment variables (a `.env`
//! file is honoured through `dotenvy`) and injected into each client at
//! construction. Missing endpoints or credentials are reported by
//! [`Config::validate`] and are fatal: the process must not start without them.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_APP_NAME, DEFAULT_GRANT_MAX_TTL_SECS,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_DOCUMENT_SIZE_MB, DEFAULT_NOTIFY_RETRY_DELAY_MS,
    GRANT_TTL_CEILING_SECS,
};
use crate::retry::{
    RetryPolicy, DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS,
};
use crate::storage_types::StorageBackend;

const MIN_SIGNING_KEY_LEN: usize = 32;

/// Settings shared by every component
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    /// Process/application identity; prefixes log streams and names the actor
    /// for events the integration layer records on its own behalf.
    pub app_name: String,
    /// `pretty` or `json`
    pub log_format: String,
    pub http_timeout_secs: u64,
}

/// Remote log sink
#[derive(Clone, Debug)]
pub struct ActivityLogConfig {
    /// `http(s)://…` collector endpoint, or `memory://` for the in-process sink
    pub sink_url: String,
    pub sink_token: Option<String>,
}

/// Object store
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO etc.)
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    /// HMAC key for grants issued by the memory backend
    pub grant_signing_key: Option<String>,
    pub grant_max_ttl_secs: u64,
    pub allowed_content_types: Vec<String>,
    pub max_document_size_bytes: usize,
}

/// Email and push channels
#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub smtp_host: String,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub smtp_tls: bool,
    pub push_topic_url: String,
    pub push_topic_token: Option<String>,
    pub retry_delay_ms: u64,
}

/// Backoff tunables for the log sink and object store
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            factor: self.factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Integration layer configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub activity: ActivityLogConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// Load from the process environment (after applying `.env`) and validate.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable source and validate.
    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed = |key: &str| -> Result<Option<u64>, anyhow::Error> {
            var(key)
                .map(|v| {
                    v.parse::<u64>()
                        .map_err(|_| anyhow::anyhow!("{} must be a valid number", key))
                })
                .transpose()
        };
        let parsed_u32 = |key: &str| -> Result<Option<u32>, anyhow::Error> {
            parsed(key)?
                .map(|n| u32::try_from(n).map_err(|_| anyhow::anyhow!("{} is too large", key)))
                .transpose()
        };
        let flag = |key: &str, default: bool| {
            var(key)
                .map(|v| v.to_lowercase().parse().unwrap_or(default))
                .unwrap_or(default)
        };

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let base = BaseConfig {
            environment,
            app_name: var("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            log_format: var("LOG_FORMAT")
                .unwrap_or_else(|| "pretty".to_string())
                .to_lowercase(),
            http_timeout_secs: parsed("HTTP_TIMEOUT_SECS")?.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let activity = ActivityLogConfig {
            sink_url: var("LOG_SINK_URL")
                .ok_or_else(|| anyhow::anyhow!("LOG_SINK_URL must be set"))?,
            sink_token: var("LOG_SINK_TOKEN"),
        };

        let backend = match var("STORAGE_BACKEND") {
            Some(value) => StorageBackend::from_str(&value)?,
            None => StorageBackend::S3,
        };

        let allowed_content_types = var("ALLOWED_CONTENT_TYPES")
            .map(|s| {
                s.split(',')
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|t| t.to_string())
                    .collect()
            });

        let max_document_size_bytes = match parsed("MAX_DOCUMENT_SIZE_MB")? {
            Some(mb) => usize::try_from(mb)
                .ok()
                .and_then(|mb| mb.checked_mul(1024 * 1024))
                .ok_or_else(|| anyhow::anyhow!("MAX_DOCUMENT_SIZE_MB is too large"))?,
            None => DEFAULT_MAX_DOCUMENT_SIZE_MB * 1024 * 1024,
        };

        let storage = StorageConfig {
            backend,
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION"),
            s3_endpoint: var("S3_ENDPOINT"),
            aws_region: var("AWS_REGION"),
            grant_signing_key: var("GRANT_SIGNING_KEY"),
            grant_max_ttl_secs: parsed("GRANT_MAX_TTL_SECS")?.unwrap_or(DEFAULT_GRANT_MAX_TTL_SECS),
            allowed_content_types,
            max_document_size_bytes,
        };

        let notify = NotifyConfig {
            smtp_host: var("SMTP_HOST").ok_or_else(|| anyhow::anyhow!("SMTP_HOST must be set"))?,
            smtp_port: parsed("SMTP_PORT")?
                .map(|p| {
                    u16::try_from(p).map_err(|_| anyhow::anyhow!("SMTP_PORT must fit in 16 bits"))
                })
                .transpose()?
                .filter(|&p| p > 0),
            smtp_user: var("SMTP_USER"),
            smtp_password: var("SMTP_PASSWORD"),
            smtp_from: var("SMTP_FROM")
                .ok_or_else(|| anyhow::anyhow!("SMTP_FROM must be set (email sender identity)"))?,
            smtp_tls: flag("SMTP_TLS", true),
            push_topic_url: var("PUSH_TOPIC_URL")
                .ok_or_else(|| anyhow::anyhow!("PUSH_TOPIC_URL must be set (push topic identity)"))?,
            push_topic_token: var("PUSH_TOPIC_TOKEN"),
            retry_delay_ms: parsed("NOTIFY_RETRY_DELAY_MS")?
                .unwrap_or(DEFAULT_NOTIFY_RETRY_DELAY_MS),
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: parsed_u32("RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            base_delay_ms: parsed("RETRY_BASE_DELAY_MS")?.unwrap_or(defaults.base_delay_ms),
            factor: parsed_u32("RETRY_FACTOR")?.unwrap_or(defaults.factor),
            max_delay_ms: parsed("RETRY_MAX_DELAY_MS")?.unwrap_or(defaults.max_delay_ms),
        };

        let config = Config {
            base,
            activity,
            storage,
            notify,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.base.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    pub fn notify_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::single_retry(Duration::from_millis(self.notify.retry_delay_ms))
    }

    pub fn grant_max_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.grant_max_ttl_secs)
    }

    /// S3 region, falling back to the generic AWS region
    pub fn s3_region(&self) -> Option<&str> {
        self.storage
            .s3_region
            .as_deref()
            .or(self.storage.aws_region.as_deref())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !matches!(self.base.log_format.as_str(), "pretty" | "json") {
            return Err(anyhow::anyhow!("LOG_FORMAT must be 'pretty' or 'json'"));
        }

        let sink_url = self.activity.sink_url.as_str();
        let is_http_sink = sink_url.starts_with("http://") || sink_url.starts_with("https://");
        if !is_http_sink && !sink_url.starts_with("memory://") {
            return Err(anyhow::anyhow!(
                "LOG_SINK_URL must be an http(s):// endpoint or memory://"
            ));
        }
        if is_http_sink && self.is_production() && self.activity.sink_token.is_none() {
            return Err(anyhow::anyhow!(
                "LOG_SINK_TOKEN must be set when using a remote log sink in production"
            ));
        }
        if !is_http_sink && self.is_production() {
            return Err(anyhow::anyhow!(
                "The in-process log sink cannot be used in production"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                let key_len = self
                    .storage
                    .grant_signing_key
                    .as_deref()
                    .map(str::len)
                    .unwrap_or(0);
                if key_len < MIN_SIGNING_KEY_LEN {
                    return Err(anyhow::anyhow!(
                        "GRANT_SIGNING_KEY must be at least {} characters long",
                        MIN_SIGNING_KEY_LEN
                    ));
                }
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "The memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        if self.storage.grant_max_ttl_secs == 0 {
            return Err(anyhow::anyhow!("GRANT_MAX_TTL_SECS must be greater than zero"));
        }
        if self.storage.grant_max_ttl_secs > GRANT_TTL_CEILING_SECS {
            return Err(anyhow::anyhow!(
                "GRANT_MAX_TTL_SECS must not exceed {} (7 days)",
                GRANT_TTL_CEILING_SECS
            ));
        }
        if self.storage.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_CONTENT_TYPES must not be empty"));
        }

        let push_url = self.notify.push_topic_url.as_str();
        if !(push_url.starts_with("http://") || push_url.starts_with("https://")) {
            return Err(anyhow::anyhow!("PUSH_TOPIC_URL must be an http(s):// endpoint"));
        }
        if self.notify.smtp_user.is_some() != self.notify.smtp_password.is_some() {
            return Err(anyhow::anyhow!(
                "SMTP_USER and SMTP_PASSWORD must be set together"
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }
        if self.retry.factor == 0 {
            return Err(anyhow::anyhow!("RETRY_FACTOR must be at least 1"));
        }

        Ok(())
    }
}
