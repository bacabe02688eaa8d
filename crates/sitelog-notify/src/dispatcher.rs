use sitelog_activity::ActivityLogClient;
use sitelog_core::{
    retry_with_policy, ActivityAction, ActivityEvent, Channel, NotificationRequest,
    NotificationSeverity, NotifyError, RetryError, RetryPolicy, Severity,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::NotificationChannel;

/// Channels a request is delivered on, in routing order.
pub fn route(request: &NotificationRequest) -> Vec<Channel> {
    let mut channels = Vec::with_capacity(2);
    if request.severity >= NotificationSeverity::Warning || request.channel == Some(Channel::Email)
    {
        channels.push(Channel::Email);
    }
    if request.severity == NotificationSeverity::Critical {
        channels.push(Channel::Push);
    }
    channels
}

/// Per-channel outcome of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Routed channels, in routing order
    pub attempted: Vec<Channel>,
    pub sent: Vec<Channel>,
    pub failed: Vec<(Channel, NotifyError)>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// First failure in routing order
    pub fn first_error(&self) -> Option<&NotifyError> {
        self.failed.first().map(|(_, error)| error)
    }

    fn push(&mut self, channel: Channel, outcome: Option<Result<(), NotifyError>>) {
        match outcome {
            None => {}
            Some(Ok(())) => {
                self.attempted.push(channel);
                self.sent.push(channel);
            }
            Some(Err(error)) => {
                self.attempted.push(channel);
                self.failed.push((channel, error));
            }
        }
    }
}

struct Inner {
    email: Arc<dyn NotificationChannel>,
    push: Arc<dyn NotificationChannel>,
    policy: RetryPolicy,
    activity: Option<ActivityLogClient>,
}

/// Severity-routed notification delivery
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<Inner>,
    cancel: CancellationToken,
}

impl NotificationDispatcher {
    /// `policy` applies per channel; the usual choice is
    /// [`RetryPolicy::single_retry`].
    pub fn new(
        email: Arc<dyn NotificationChannel>,
        push: Arc<dyn NotificationChannel>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                email,
                push,
                policy,
                activity: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Record delivery outcomes on `activity` (best effort, never awaited).
    pub fn with_activity_log(self, activity: ActivityLogClient) -> Self {
        let inner = Inner {
            email: self.inner.email.clone(),
            push: self.inner.push.clone(),
            policy: self.inner.policy,
            activity: Some(activity),
        };
        Self {
            inner: Arc::new(inner),
            cancel: self.cancel,
        }
    }

    /// Handle whose retry loops stop when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: token,
        }
    }

    /// Deliver `request` and fail if any routed channel failed.
    ///
    /// With several failed channels the first in routing order is reported.
    /// An `info` request without a subscription attempts nothing and succeeds.
    pub async fn dispatch(&self, request: NotificationRequest) -> Result<DispatchReport, NotifyError> {
        let report = self.dispatch_report(&request).await?;
        match report.first_error() {
            Some(error) => Err(error.clone()),
            None => Ok(report),
        }
    }

    /// Deliver `request` and return every channel's outcome.
    ///
    /// Only an invalid request is an error here; channel failures are in the
    /// report.
    pub async fn dispatch_report(
        &self,
        request: &NotificationRequest,
    ) -> Result<DispatchReport, NotifyError> {
        let channels = route(request);
        let wants_email = channels.contains(&Channel::Email);
        let wants_push = channels.contains(&Channel::Push);

        if wants_email && request.recipient.trim().is_empty() {
            return Err(NotifyError::InvalidRequest(
                "email recipient must not be empty".to_string(),
            ));
        }
        if channels.is_empty() {
            tracing::debug!(
                event_type = %request.event_type,
                severity = %request.severity,
                "No channel routed for notification"
            );
            return Ok(DispatchReport::default());
        }

        let start = Instant::now();
        let email = async {
            if wants_email {
                Some(self.deliver(self.inner.email.as_ref(), request).await)
            } else {
                None
            }
        };
        let push = async {
            if wants_push {
                Some(self.deliver(self.inner.push.as_ref(), request).await)
            } else {
                None
            }
        };
        let (email, push) = tokio::join!(email, push);

        let mut report = DispatchReport::default();
        report.push(Channel::Email, email);
        report.push(Channel::Push, push);

        tracing::info!(
            event_type = %request.event_type,
            severity = %request.severity,
            attempted = report.attempted.len(),
            sent = report.sent.len(),
            failed = report.failed.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Notification dispatched"
        );

        Ok(report)
    }

    async fn deliver(
        &self,
        channel: &dyn NotificationChannel,
        request: &NotificationRequest,
    ) -> Result<(), NotifyError> {
        let kind = channel.channel();
        let result = retry_with_policy(&self.inner.policy, &self.cancel, "notify.send", |_| {
            channel.send(request)
        })
        .await;

        match result {
            Ok(()) => {
                self.record_event(|actor| {
                    ActivityEvent::new(actor, ActivityAction::NotificationSent)
                        .with_target(request.recipient.as_str())
                        .with_detail(format!(
                            "channel={} event_type={} severity={}",
                            kind, request.event_type, request.severity
                        ))
                });
                Ok(())
            }
            Err(RetryError::Cancelled { .. }) => Err(NotifyError::Cancelled),
            Err(e) => {
                let attempts = e.attempts();
                let message = match e {
                    RetryError::Exhausted { last, .. } => last.to_string(),
                    RetryError::Permanent { error, .. } => error.to_string(),
                    RetryError::Cancelled { .. } => String::new(),
                };
                tracing::warn!(
                    channel = %kind,
                    event_type = %request.event_type,
                    attempts = attempts,
                    error = %message,
                    "Notification channel failed"
                );
                self.record_event(|actor| {
                    ActivityEvent::new(actor, ActivityAction::Error)
                        .with_target(request.recipient.as_str())
                        .with_severity(Severity::Error)
                        .with_detail(format!(
                            "notification failed: channel={} event_type={} attempts={} error={}",
                            kind, request.event_type, attempts, message
                        ))
                });
                Err(NotifyError::ChannelUnavailable(kind))
            }
        }
    }

    fn record_event(&self, build: impl FnOnce(&str) -> ActivityEvent) {
        if let Some(activity) = &self.inner.activity {
            activity.record_detached(build(activity.service_actor()));
        }
    }
}
