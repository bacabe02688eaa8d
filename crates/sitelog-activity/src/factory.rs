use sitelog_core::Config;
use std::sync::Arc;

use crate::{HttpSink, LogSink, MemorySink, SinkError};

/// Create the log sink selected by `LOG_SINK_URL`
pub fn create_sink(config: &Config) -> Result<Arc<dyn LogSink>, SinkError> {
    let url = config.activity.sink_url.as_str();

    if url.starts_with("memory://") {
        tracing::warn!("Using in-process log sink; activity events are not persisted");
        return Ok(Arc::new(MemorySink::new()));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let sink = HttpSink::new(
            url,
            config.activity.sink_token.clone(),
            config.http_timeout(),
        )?;
        return Ok(Arc::new(sink));
    }

    Err(SinkError::Config(format!(
        "Unsupported LOG_SINK_URL scheme: {}",
        url
    )))
}
