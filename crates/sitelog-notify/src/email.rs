//! Email channel over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::{self, authentication::Credentials};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sitelog_core::{Channel, Config, NotificationRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::{ChannelError, NotificationChannel};

const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP settings for [`EmailChannel::new`]
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub tls: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Sender identity, e.g. `Sitelog <alerts@example.com>`
    pub from: String,
    pub timeout: Duration,
}

/// Plain-text email channel
///
/// A send that fails after the message may have reached the server (timeout,
/// dropped connection, unreadable reply) is reported as `Ambiguous`, so the
/// dispatcher never sends it a second time.
#[derive(Clone)]
pub struct EmailChannel {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(settings: SmtpSettings) -> Result<Self, ChannelError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| ChannelError::Config(format!("Invalid SMTP_FROM: {}", e)))?;
        let host = settings.host.as_str();
        let port = settings.port.unwrap_or(DEFAULT_SMTP_PORT);
        let credentials = match (settings.user, settings.password) {
            (Some(u), Some(p)) => Some(Credentials::new(u, p)),
            _ => None,
        };

        let builder = if settings.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| ChannelError::Config(format!("Invalid SMTP_HOST: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let builder = builder.port(port).timeout(Some(settings.timeout));
        let builder = match credentials {
            Some(credentials) => builder.credentials(credentials),
            None => builder,
        };

        tracing::info!(
            host = %host,
            port = port,
            tls = settings.tls,
            "Email channel initialized"
        );

        Ok(Self {
            mailer: Arc::new(builder.build()),
            from,
            timeout: settings.timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ChannelError> {
        let notify = &config.notify;
        Self::new(SmtpSettings {
            host: notify.smtp_host.clone(),
            port: notify.smtp_port,
            tls: notify.smtp_tls,
            user: notify.smtp_user.clone(),
            password: notify.smtp_password.clone(),
            from: notify.smtp_from.clone(),
            timeout: config.http_timeout(),
        })
    }

    fn build_message(&self, request: &NotificationRequest) -> Result<Message, ChannelError> {
        let to: Mailbox = request.recipient.parse().map_err(|e| {
            ChannelError::Rejected(format!("Invalid recipient '{}': {}", request.recipient, e))
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(request.payload.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(request.payload.body.clone())
            .map_err(|e| ChannelError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, request: &NotificationRequest) -> Result<(), ChannelError> {
        let email = self.build_message(request)?;
        let start = Instant::now();

        // The transport's own timeout only covers connecting.
        let result = tokio::time::timeout(self.timeout, self.mailer.send(email))
            .await
            .map_err(|_| {
                ChannelError::Ambiguous(format!(
                    "no reply from SMTP server within {:?}",
                    self.timeout
                ))
            })
            .and_then(|sent| sent.map_err(|e| classify_smtp_error(&e)));

        if let Err(ref e) = result {
            tracing::debug!(
                error = %e,
                event_type = %request.event_type,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "SMTP send failed"
            );
        }
        result?;

        tracing::info!(
            event_type = %request.event_type,
            severity = %request.severity,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Notification email sent"
        );
        Ok(())
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}

/// Map an SMTP failure by the stage it happened in.
fn classify_smtp_error(e: &smtp::Error) -> ChannelError {
    if e.is_permanent() {
        ChannelError::Rejected(e.to_string())
    } else if e.is_transient() || e.is_tls() || e.is_transport_shutdown() || failed_to_connect(e)
    {
        // Refused by the server or failed before any envelope was sent
        ChannelError::Unavailable(e.to_string())
    } else {
        ChannelError::Ambiguous(e.to_string())
    }
}

/// lettre has no predicate for connect failures; they render with a fixed prefix.
fn failed_to_connect(e: &smtp::Error) -> bool {
    e.to_string().starts_with("Connection error")
}
