use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the process.
///
/// `RUST_LOG` overrides the default filter. `log_format` is `"json"` for
/// structured output, anything else gives human-readable lines.
pub fn init_telemetry(app_name: &str, log_format: &str) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(app_name)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::debug!(log_format = %log_format, "Tracing initialized");
    Ok(())
}

fn default_filter(app_name: &str) -> String {
    let target = app_name.replace('-', "_");
    format!("info,sitelog=debug,{}=debug", target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_app_target() {
        assert_eq!(
            default_filter("site-log"),
            "info,sitelog=debug,site_log=debug"
        );
    }

    #[test]
    fn second_init_is_an_error() {
        let _ = init_telemetry("sitelog", "pretty");
        assert!(init_telemetry("sitelog", "json").is_err());
    }
}
