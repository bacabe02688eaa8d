use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::NotifyError;

/// Outbound notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "push" => Ok(Channel::Push),
            _ => Err(NotifyError::InvalidRequest(format!("unknown channel: {}", s))),
        }
    }
}

/// Notification severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl NotificationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationSeverity::Info => "info",
            NotificationSeverity::Warning => "warning",
            NotificationSeverity::Error => "error",
            NotificationSeverity::Critical => "critical",
        }
    }
}

impl Display for NotificationSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationSeverity {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(NotificationSeverity::Info),
            "warning" | "warn" => Ok(NotificationSeverity::Warning),
            "error" => Ok(NotificationSeverity::Error),
            "critical" => Ok(NotificationSeverity::Critical),
            _ => Err(NotifyError::InvalidRequest(format!("unknown severity: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub subject: String,
    pub body: String,
}

/// A single dispatch attempt. Transient: only its outcome is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Stable across retries; channels that can deduplicate send it along.
    pub notification_id: Uuid,
    /// Explicit subscription. `Some(Email)` forces email regardless of severity.
    pub channel: Option<Channel>,
    pub recipient: String,
    pub event_type: String,
    pub severity: NotificationSeverity,
    pub payload: NotificationPayload,
}

impl NotificationRequest {
    pub fn new(
        recipient: impl Into<String>,
        event_type: impl Into<String>,
        severity: NotificationSeverity,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            channel: None,
            recipient: recipient.into(),
            event_type: event_type.into(),
            severity,
            payload: NotificationPayload {
                subject: subject.into(),
                body: body.into(),
            },
        }
    }

    pub fn subscribed(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }
}
