//! Sitelog Activity Log
//!
//! Records [`ActivityEvent`](sitelog_core::ActivityEvent)s to an append-only
//! remote sink. The client resolves timestamps and per-instance sequence numbers,
//! validates events, and retries transient sink failures with the shared
//! [`RetryPolicy`](sitelog_core::RetryPolicy).
//!
//! Callers treat logging as best-effort: a failed `record` must never undo the
//! business operation that triggered it. [`ActivityLogClient::record_detached`]
//! is the fire-and-forget form used by the other integration clients.

pub mod client;
pub mod factory;
pub mod http;
pub mod memory;
pub mod sink;

// Re-export commonly used types
pub use client::ActivityLogClient;
pub use factory::create_sink;
pub use http::HttpSink;
pub use memory::MemorySink;
pub use sink::{LogSink, SinkError};
