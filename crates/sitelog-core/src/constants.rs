//! Defaults shared by configuration and the clients.

/// Application identity used for log streams when `APP_NAME` is unset.
pub const DEFAULT_APP_NAME: &str = "sitelog";

/// Upper bound for access grant lifetimes (1 hour).
pub const DEFAULT_GRANT_MAX_TTL_SECS: u64 = 3600;

/// Largest accepted `GRANT_MAX_TTL_SECS` (7 days, the S3 presigning limit).
pub const GRANT_TTL_CEILING_SECS: u64 = 7 * 24 * 3600;

/// Maximum accepted document size in megabytes.
pub const DEFAULT_MAX_DOCUMENT_SIZE_MB: usize = 50;

/// Content types accepted for uploaded documents unless overridden.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "text/plain",
    "text/csv",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Maximum size of `ActivityEvent::detail` in bytes.
pub const MAX_EVENT_DETAIL_BYTES: usize = 32 * 1024;

/// Delay before the single notification retry.
pub const DEFAULT_NOTIFY_RETRY_DELAY_MS: u64 = 50;

/// Timeout applied to outbound HTTP calls (log sink, push topic).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
