//! Sitelog CLI: operator commands for the activity log, document store and
//! notification channels.
//!
//! Configuration comes from the environment (and `.env`); see `sitelog_core::Config`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sitelog_core::{
    ActivityAction, ActivityEvent, Channel, Config, NotificationRequest, NotificationSeverity,
    Severity,
};
use sitelog_infra::{init_telemetry, Integrations};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sitelog", about = "Sitelog integration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and build every client, then exit
    CheckConfig,
    /// Record an activity event
    Log {
        /// Acting user id
        actor: String,
        /// Action: login, logout, view, record_created, upload, error, ...
        action: String,
        /// Affected record id
        #[arg(long)]
        target: Option<String>,
        #[arg(long, default_value = "")]
        detail: String,
        /// info, warning or error
        #[arg(long)]
        severity: Option<String>,
    },
    /// Upload a document for a record
    Upload {
        /// Owning record id
        owner: String,
        /// Path to the file to upload
        file: PathBuf,
        /// Content type; guessed from the file extension if omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Replace a stored document with new content
    Replace {
        /// Current object key
        key: String,
        /// Path to the new content
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Delete a stored document
    Delete {
        /// Object key
        key: String,
    },
    /// Issue a time-limited access URL
    Grant {
        /// Object key
        key: String,
        /// Lifetime in seconds (clamped to GRANT_MAX_TTL_SECS)
        #[arg(long, default_value = "600")]
        ttl: u64,
    },
    /// Send a notification
    Notify {
        recipient: String,
        /// info, warning, error or critical
        severity: String,
        #[arg(long, default_value = "manual")]
        event_type: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Explicit channel subscription (email)
        #[arg(long)]
        channel: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

async fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Upper bound on waiting for outcome events before exit
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

async fn run(command: Commands, config: &Config, cancel: &CancellationToken) -> anyhow::Result<()> {
    let integrations = Integrations::from_config(config)?.with_cancellation(cancel.clone());
    let result = execute(command, config, &integrations).await;

    if !integrations.shutdown(FLUSH_TIMEOUT).await {
        tracing::warn!("Some activity events were not delivered before exit");
    }
    result
}

async fn execute(
    command: Commands,
    config: &Config,
    integrations: &Integrations,
) -> anyhow::Result<()> {
    match command {
        Commands::CheckConfig => {
            tracing::info!(
                environment = %config.base.environment,
                storage_backend = %config.storage.backend,
                "Configuration is valid"
            );
            println!("configuration OK ({})", config.base.environment);
        }
        Commands::Log {
            actor,
            action,
            target,
            detail,
            severity,
        } => {
            let action: ActivityAction = action.parse()?;
            let mut event = ActivityEvent::new(actor, action).with_detail(detail);
            if let Some(target) = target {
                event = event.with_target(target);
            }
            if let Some(severity) = severity {
                event = event.with_severity(severity.parse::<Severity>()?);
            }
            let entry = integrations.activity.record(event).await?;
            print_json(&entry)?;
        }
        Commands::Upload {
            owner,
            file,
            content_type,
        } => {
            let content = read_file(&file).await?;
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&file).to_string());
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("File name is not valid UTF-8")?;
            let document = integrations
                .documents
                .upload(&owner, filename, content, &content_type)
                .await?;
            print_json(&document)?;
        }
        Commands::Replace {
            key,
            file,
            content_type,
        } => {
            let content = read_file(&file).await?;
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&file).to_string());
            let document = integrations
                .documents
                .replace(&key, content, &content_type)
                .await?;
            print_json(&document)?;
        }
        Commands::Delete { key } => {
            integrations.documents.delete(&key).await?;
            print_json(&serde_json::json!({ "deleted": key }))?;
        }
        Commands::Grant { key, ttl } => {
            let grant = integrations
                .documents
                .grant_access(&key, Duration::from_secs(ttl))
                .await?;
            print_json(&grant)?;
        }
        Commands::Notify {
            recipient,
            severity,
            event_type,
            subject,
            body,
            channel,
        } => {
            let severity: NotificationSeverity = severity.parse()?;
            let mut request = NotificationRequest::new(recipient, event_type, severity, subject, body);
            if let Some(channel) = channel {
                request = request.subscribed(channel.parse::<Channel>()?);
            }
            let report = integrations
                .notifications
                .dispatch_report(&request)
                .await?;
            let failed: Vec<String> = report
                .failed
                .iter()
                .map(|(channel, error)| format!("{}: {}", channel, error))
                .collect();
            print_json(&serde_json::json!({
                "attempted": report.attempted,
                "sent": report.sent,
                "failed": failed,
            }))?;
            if let Some(error) = report.first_error() {
                anyhow::bail!("{}", error);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    init_telemetry(&config.base.app_name, &config.base.log_format)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling pending retries");
                cancel.cancel();
            }
        }
    });

    run(cli.command, &config, &cancel).await
}
