use anyhow::Context;
use sitelog_activity::{create_sink, ActivityLogClient};
use sitelog_core::Config;
use sitelog_notify::{EmailChannel, NotificationDispatcher, PushChannel};
use sitelog_storage::{create_storage, DocumentLimits, ObjectStoreClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The three integration clients, wired to share one activity log
#[derive(Clone)]
pub struct Integrations {
    pub activity: ActivityLogClient,
    pub documents: ObjectStoreClient,
    pub notifications: NotificationDispatcher,
}

impl Integrations {
    /// Attach `activity` to the other two clients so their outcomes are logged.
    pub fn new(
        activity: ActivityLogClient,
        documents: ObjectStoreClient,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            documents: documents.with_activity_log(activity.clone()),
            notifications: notifications.with_activity_log(activity.clone()),
            activity,
        }
    }

    /// Build every client from configuration.
    ///
    /// Missing endpoints or credentials are fatal; nothing is retried here.
    pub fn from_config(config: &Config) -> Result<Self, anyhow::Error> {
        let sink = create_sink(config).context("Failed to create activity log sink")?;
        let activity = ActivityLogClient::new(sink, &config.base.app_name, config.retry_policy());

        let storage = create_storage(config).context("Failed to create storage backend")?;
        let documents = ObjectStoreClient::new(
            storage,
            config.retry_policy(),
            DocumentLimits::from_config(config),
        );

        let email = EmailChannel::from_config(config).context("Failed to create email channel")?;
        let push = PushChannel::from_config(config).context("Failed to create push channel")?;
        let notifications = NotificationDispatcher::new(
            Arc::new(email),
            Arc::new(push),
            config.notify_retry_policy(),
        );

        tracing::info!(
            environment = %config.base.environment,
            storage_backend = %config.storage.backend,
            "Integrations initialized"
        );

        Ok(Self::new(activity, documents, notifications))
    }

    /// Handles whose retry loops all stop when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self::new(
            self.activity.with_cancellation(token.clone()),
            self.documents.with_cancellation(token.clone()),
            self.notifications.with_cancellation(token),
        )
    }

    /// Wait for outcome events still being delivered to the activity log.
    ///
    /// Call before the process exits. Returns `false` if some were still
    /// pending after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let flushed = self.activity.flush(timeout).await;
        tracing::debug!(flushed, "Integrations shut down");
        flushed
    }
}
