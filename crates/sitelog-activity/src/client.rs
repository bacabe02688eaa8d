use chrono::Utc;
use sitelog_core::{
    retry_with_policy, ActivityEvent, LogEntry, LogError, RetryError, RetryPolicy,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::sink::{LogSink, SinkError};

struct Inner {
    sink: Arc<dyn LogSink>,
    stream: String,
    service_actor: String,
    sequence: AtomicU64,
    policy: RetryPolicy,
    detached: TaskTracker,
}

/// Client for the remote activity log
///
/// Cheap to clone; clones share the sink, stream and sequence counter, so every
/// clone appends to the same ordered stream. No locks are taken on the call path.
#[derive(Clone)]
pub struct ActivityLogClient {
    inner: Arc<Inner>,
    cancel: CancellationToken,
}

impl ActivityLogClient {
    /// Create a client appending to `{app_name}-{YYYY-MM-DD}` on `sink`.
    pub fn new(sink: Arc<dyn LogSink>, app_name: &str, policy: RetryPolicy) -> Self {
        let service_actor = sanitize_stream_component(app_name);
        let stream = format!("{}-{}", service_actor, Utc::now().format("%Y-%m-%d"));

        tracing::info!(
            sink = sink.name(),
            stream = %stream,
            max_attempts = policy.max_attempts,
            "Activity log client initialized"
        );

        Self {
            inner: Arc::new(Inner {
                sink,
                stream,
                service_actor,
                sequence: AtomicU64::new(0),
                policy,
                detached: TaskTracker::new(),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Handle whose retry loops stop when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: token,
        }
    }

    pub fn stream(&self) -> &str {
        &self.inner.stream
    }

    /// Actor id for events the integration layer records on its own behalf
    pub fn service_actor(&self) -> &str {
        &self.inner.service_actor
    }

    /// Append one event, retrying transient sink failures.
    ///
    /// Malformed events fail with `InvalidEvent` without touching the sink.
    /// Exhausted retries return `Unavailable` and leave no entry behind.
    pub async fn record(&self, event: ActivityEvent) -> Result<LogEntry, LogError> {
        event.validate()?;
        let entry = self.prepare(event);
        append_with_retry(&self.inner, &self.cancel, entry).await
    }

    /// Record without waiting. Failures are logged and dropped.
    ///
    /// The sequence number and timestamp are taken now, so ordering reflects
    /// the call order even though the append happens later. Pending appends
    /// are awaited by [`ActivityLogClient::flush`].
    pub fn record_detached(&self, event: ActivityEvent) {
        if let Err(e) = event.validate() {
            tracing::warn!(error = %e, action = %event.action, "Dropping invalid activity event");
            return;
        }
        let entry = self.prepare(event);

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    action = %entry.event.action,
                    "No async runtime available, activity event dropped"
                );
                return;
            }
        };

        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        self.inner.detached.spawn_on(
            async move {
                if let Err(e) = append_with_retry(&inner, &cancel, entry).await {
                    tracing::warn!(error = %e, "Best-effort activity logging failed");
                }
            },
            &handle,
        );
    }

    /// Number of detached appends still running
    pub fn pending(&self) -> usize {
        self.inner.detached.len()
    }

    /// Wait up to `timeout` for every detached append to finish.
    ///
    /// Returns `false` if some were still running when the time ran out.
    /// Detached recording keeps working after a flush.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let detached = &self.inner.detached;
        detached.close();
        let finished = tokio::time::timeout(timeout, detached.wait()).await.is_ok();
        detached.reopen();

        if !finished {
            tracing::warn!(
                pending = detached.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Activity events still pending after flush timeout"
            );
        }
        finished
    }

    fn prepare(&self, event: ActivityEvent) -> LogEntry {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        LogEntry::new(self.inner.stream.clone(), sequence, event)
    }
}

async fn append_with_retry(
    inner: &Inner,
    cancel: &CancellationToken,
    entry: LogEntry,
) -> Result<LogEntry, LogError> {
    let sink = &inner.sink;
    let result = retry_with_policy(&inner.policy, cancel, "activity_log.record", |_| {
        sink.append(&entry)
    })
    .await;

    match result {
        Ok(()) => {
            tracing::debug!(
                stream = %entry.stream,
                sequence = entry.sequence,
                action = %entry.event.action,
                "Activity event recorded"
            );
            Ok(entry)
        }
        Err(e) => {
            let error = map_retry_error(e);
            tracing::warn!(
                error = %error,
                stream = %entry.stream,
                action = %entry.event.action,
                "Activity event not recorded"
            );
            Err(error)
        }
    }
}

fn map_retry_error(err: RetryError<SinkError>) -> LogError {
    match err {
        RetryError::Exhausted { attempts, last } => LogError::Unavailable {
            attempts,
            message: last.to_string(),
        },
        RetryError::Permanent {
            error: SinkError::Rejected(message),
            ..
        } => LogError::InvalidEvent(message),
        RetryError::Permanent { attempt, error } => LogError::Unavailable {
            attempts: attempt,
            message: error.to_string(),
        },
        RetryError::Cancelled { .. } => LogError::Cancelled,
    }
}

fn sanitize_stream_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        sitelog_core::constants::DEFAULT_APP_NAME.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySink;
    use sitelog_core::{ActivityAction, Severity};

    fn client(sink: &MemorySink) -> ActivityLogClient {
        ActivityLogClient::new(Arc::new(sink.clone()), "sitelog", RetryPolicy::default())
    }

    #[tokio::test]
    async fn records_one_entry_with_resolved_timestamp() {
        let sink = MemorySink::new();
        let entry = client(&sink)
            .record(ActivityEvent::login("alice", Some("10.0.0.1")))
            .await
            .unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.entries()[0], entry);
        assert!(entry.event.timestamp.is_some());
        assert!(entry.stream.starts_with("sitelog-"));
    }

    #[tokio::test]
    async fn preserves_call_order_within_a_client() {
        let sink = MemorySink::new();
        let client = client(&sink);
        for action in [
            ActivityAction::Login,
            ActivityAction::View,
            ActivityAction::Logout,
        ] {
            client
                .record(ActivityEvent::new("alice", action))
                .await
                .unwrap();
        }

        let entries = sink.entries();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(entries[2].event.action, ActivityAction::Logout);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let sink = MemorySink::new();
        sink.fail_next(2);
        client(&sink)
            .record(ActivityEvent::view("alice", "proj-1"))
            .await
            .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_no_entry() {
        let sink = MemorySink::new();
        sink.fail_next(10);
        let err = client(&sink)
            .record(ActivityEvent::view("alice", "proj-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, LogError::Unavailable { attempts: 3, .. }));
        assert!(sink.is_empty());
        assert_eq!(sink.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_acknowledgement_does_not_duplicate() {
        let sink = MemorySink::new();
        sink.lose_ack_next(1);
        client(&sink)
            .record(ActivityEvent::view("alice", "proj-1"))
            .await
            .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn invalid_events_fail_fast() {
        let sink = MemorySink::new();
        let err = client(&sink)
            .record(ActivityEvent::new("", ActivityAction::Login))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::InvalidEvent(_)));
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn sink_rejection_is_not_retried() {
        let sink = MemorySink::new();
        sink.reject_all(true);
        let err = client(&sink)
            .record(ActivityEvent::logout("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::InvalidEvent(_)));
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test]
    async fn cancelled_client_stops_before_appending() {
        let sink = MemorySink::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = client(&sink)
            .with_cancellation(token)
            .record(ActivityEvent::logout("bob"))
            .await
            .unwrap_err();
        assert_eq!(err, LogError::Cancelled);
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn detached_records_eventually_land() {
        let sink = MemorySink::new();
        client(&sink).record_detached(
            ActivityEvent::new("system", ActivityAction::Error).with_severity(Severity::Error),
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("detached event recorded");
        assert_eq!(sink.entries()[0].event.action, ActivityAction::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_waits_for_detached_retries() {
        let sink = MemorySink::new();
        sink.fail_next(2);
        let client = client(&sink);
        client.record_detached(ActivityEvent::view("alice", "proj-1"));
        client.record_detached(ActivityEvent::logout("alice"));

        assert!(client.flush(Duration::from_secs(10)).await);
        assert_eq!(sink.len(), 2);
        assert_eq!(client.pending(), 0);

        client.record_detached(ActivityEvent::login("alice", None));
        assert!(client.flush(Duration::from_secs(10)).await);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_gives_up_after_timeout() {
        let sink = MemorySink::new();
        sink.fail_next(10);
        let client = client(&sink);
        client.record_detached(ActivityEvent::view("alice", "proj-1"));

        assert!(!client.flush(Duration::from_millis(50)).await);
        assert_eq!(client.pending(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn stream_name_is_sanitized() {
        assert_eq!(sanitize_stream_component("site log/prod"), "site-log-prod");
        assert_eq!(sanitize_stream_component("  "), "sitelog");
    }
}
