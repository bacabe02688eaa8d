//! Sitelog Infrastructure
//!
//! Process-level setup shared by binaries: tracing initialization and
//! construction of the three integration clients from [`Config`](sitelog_core::Config).

pub mod integrations;
pub mod telemetry;

pub use integrations::Integrations;
pub use telemetry::init_telemetry;
