use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sitelog_core::{Channel, Config, NotificationRequest};
use std::time::{Duration, Instant};

use crate::channel::{ChannelError, NotificationChannel};

/// Push channel publishing to a topic endpoint
///
/// Each send is one `POST {topic_url}` with a JSON body; the topic service fans
/// the message out to subscribed devices. The notification id travels as the
/// `Idempotency-Key` header. A request that went out without an answer is
/// reported as `Ambiguous` and never resent.
#[derive(Clone)]
pub struct PushChannel {
    client: Client,
    topic_url: String,
    token: Option<String>,
}

impl PushChannel {
    pub fn new(
        topic_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            topic_url: topic_url.into(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ChannelError> {
        Self::new(
            config.notify.push_topic_url.clone(),
            config.notify.push_topic_token.clone(),
            config.http_timeout(),
        )
    }
}

#[async_trait]
impl NotificationChannel for PushChannel {
    async fn send(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        let start = Instant::now();
        let body = serde_json::json!({
            "recipient": request.recipient,
            "event_type": request.event_type,
            "severity": request.severity,
            "title": request.payload.subject,
            "message": request.payload.body,
        });

        let mut http_request = self
            .client
            .post(&self.topic_url)
            .header("Idempotency-Key", request.notification_id.to_string())
            .json(&body);
        if let Some(ref token) = self.token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request.send().await.map_err(|e| {
            tracing::debug!(
                error = %e,
                timeout = e.is_timeout(),
                connect = e.is_connect(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Push publish request failed"
            );
            if e.is_connect() {
                ChannelError::Unavailable(e.to_string())
            } else if e.is_builder() {
                ChannelError::Config(e.to_string())
            } else {
                ChannelError::Ambiguous(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(
                event_type = %request.event_type,
                severity = %request.severity,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Push notification published"
            );
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status.as_u16(), text);
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Err(ChannelError::Unavailable(message))
        } else {
            Err(ChannelError::Rejected(message))
        }
    }

    fn channel(&self) -> Channel {
        Channel::Push
    }
}
