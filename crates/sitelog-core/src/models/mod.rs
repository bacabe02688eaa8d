//! Domain models exchanged with the integration clients.

pub mod activity;
pub mod document;
pub mod notification;

pub use activity::{ActivityAction, ActivityEvent, LogEntry, Severity};
pub use document::{AccessGrant, StoredDocument};
pub use notification::{Channel, NotificationPayload, NotificationRequest, NotificationSeverity};
