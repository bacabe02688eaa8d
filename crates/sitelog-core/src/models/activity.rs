use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::MAX_EVENT_DETAIL_BYTES;
use crate::error::LogError;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Login,
    Logout,
    View,
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    Upload,
    DocumentDeleted,
    AccessGranted,
    NotificationSent,
    Error,
}

impl ActivityAction {
    pub const ALL: [ActivityAction; 11] = [
        ActivityAction::Login,
        ActivityAction::Logout,
        ActivityAction::View,
        ActivityAction::RecordCreated,
        ActivityAction::RecordUpdated,
        ActivityAction::RecordDeleted,
        ActivityAction::Upload,
        ActivityAction::DocumentDeleted,
        ActivityAction::AccessGranted,
        ActivityAction::NotificationSent,
        ActivityAction::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Login => "login",
            ActivityAction::Logout => "logout",
            ActivityAction::View => "view",
            ActivityAction::RecordCreated => "record_created",
            ActivityAction::RecordUpdated => "record_updated",
            ActivityAction::RecordDeleted => "record_deleted",
            ActivityAction::Upload => "upload",
            ActivityAction::DocumentDeleted => "document_deleted",
            ActivityAction::AccessGranted => "access_granted",
            ActivityAction::NotificationSent => "notification_sent",
            ActivityAction::Error => "error",
        }
    }
}

impl Display for ActivityAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityAction {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ActivityAction::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| LogError::InvalidEvent(format!("unknown action: {}", s)))
    }
}

/// Activity severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(LogError::InvalidEvent(format!("unknown severity: {}", s))),
        }
    }
}

/// A single audit-trail record.
///
/// `timestamp` is left unset by most constructors; the activity log client fills
/// in the call time when the event is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub actor_id: String,
    pub action: ActivityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub detail: String,
    pub severity: Severity,
}

impl ActivityEvent {
    /// New event with an empty detail. `Error` actions default to error severity.
    pub fn new(actor_id: impl Into<String>, action: ActivityAction) -> Self {
        let severity = if action == ActivityAction::Error {
            Severity::Error
        } else {
            Severity::Info
        };
        Self {
            timestamp: None,
            actor_id: actor_id.into(),
            action,
            target_id: None,
            detail: String::new(),
            severity,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn login(actor_id: impl Into<String>, ip_address: Option<&str>) -> Self {
        let event = Self::new(actor_id, ActivityAction::Login).with_target("user_auth");
        match ip_address.filter(|ip| !ip.is_empty()) {
            Some(ip) => event.with_detail(format!("ip_address={}", ip)),
            None => event,
        }
    }

    pub fn logout(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, ActivityAction::Logout).with_target("user_auth")
    }

    pub fn file_upload(actor_id: impl Into<String>, filename: &str, record_id: &str) -> Self {
        Self::new(actor_id, ActivityAction::Upload)
            .with_target(record_id)
            .with_detail(format!("filename={}", filename))
    }

    pub fn view(actor_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::new(actor_id, ActivityAction::View).with_target(target_id)
    }

    /// Check the constraints the sink relies on.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.actor_id.trim().is_empty() {
            return Err(LogError::InvalidEvent("actor_id must not be empty".to_string()));
        }
        if self.detail.len() > MAX_EVENT_DETAIL_BYTES {
            return Err(LogError::InvalidEvent(format!(
                "detail is {} bytes, limit is {}",
                self.detail.len(),
                MAX_EVENT_DETAIL_BYTES
            )));
        }
        Ok(())
    }
}

/// An event as appended to the sink.
///
/// `entry_id` stays the same across retries of one `record` call so sinks can
/// drop duplicates. `sequence` increases per client instance in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_id: Uuid,
    pub stream: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: ActivityEvent,
}

impl LogEntry {
    /// Resolve the event timestamp (call time if unset) and wrap it for appending.
    pub fn new(stream: impl Into<String>, sequence: u64, mut event: ActivityEvent) -> Self {
        let timestamp = *event.timestamp.get_or_insert_with(Utc::now);
        Self {
            entry_id: Uuid::new_v4(),
            stream: stream.into(),
            sequence,
            timestamp,
            event,
        }
    }
}
