use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sitelog_core::LogEntry;
use std::time::{Duration, Instant};

use crate::sink::{LogSink, SinkError};

/// HTTP log collector sink
///
/// Appends each entry with `POST {endpoint}/streams/{stream}/events`. The entry
/// id travels as the `Idempotency-Key` header so a retried append after a lost
/// response does not create a second record.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpSink {
    /// Create a new HttpSink
    ///
    /// # Arguments
    /// * `endpoint` - Collector base URL (e.g. "https://logs.example.com")
    /// * `token` - Optional bearer token
    /// * `timeout` - Per-request timeout; a timeout counts as unavailability
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    fn events_url(&self, stream: &str) -> String {
        format!(
            "{}/streams/{}/events",
            self.endpoint.trim_end_matches('/'),
            stream
        )
    }
}

#[async_trait]
impl LogSink for HttpSink {
    async fn append(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let url = self.events_url(&entry.stream);
        let start = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .header("Idempotency-Key", entry.entry_id.to_string())
            .json(entry);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(
                error = %e,
                stream = %entry.stream,
                timeout = e.is_timeout(),
                connect = e.is_connect(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Log sink request failed"
            );
            SinkError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                stream = %entry.stream,
                sequence = entry.sequence,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Log entry appended"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status.as_u16(), body);
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Err(SinkError::Unavailable(message))
        } else {
            Err(SinkError::Rejected(message))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use sitelog_core::ActivityEvent;

    fn entry() -> LogEntry {
        LogEntry::new("sitelog-2026-10-16", 1, ActivityEvent::login("alice", None))
    }

    #[tokio::test]
    async fn appends_with_idempotency_key_and_token() {
        let mut server = mockito::Server::new_async().await;
        let entry = entry();
        let mock = server
            .mock("POST", "/streams/sitelog-2026-10-16/events")
            .match_header("idempotency-key", entry.entry_id.to_string().as_str())
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJsonString(
                r#"{"event":{"action":"login","actor_id":"alice"}}"#.to_string(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let sink = HttpSink::new(
            server.url(),
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        sink.append(&entry).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let sink = HttpSink::new(server.url(), None, Duration::from_secs(5)).unwrap();
        let err = sink.append(&entry()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(422)
            .with_body("bad event")
            .create_async()
            .await;

        let sink = HttpSink::new(server.url(), None, Duration::from_secs(5)).unwrap();
        let err = sink.append(&entry()).await.unwrap_err();
        assert_eq!(err, SinkError::Rejected("HTTP 422: bad event".to_string()));
    }

    #[tokio::test]
    async fn connection_failures_are_unavailable() {
        // Nothing listens on port 9 (discard) in the test environment.
        let sink = HttpSink::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let err = sink.append(&entry()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }
}
