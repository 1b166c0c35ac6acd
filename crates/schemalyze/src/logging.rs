//! Tracing setup for binaries.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::error::SchemalyzeError;

const DEFAULT_FILTER: &str = "info";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Installs the global subscriber and bridges `log` records into it.
///
/// Honors `RUST_LOG`, defaulting to `info`. Fails if a global subscriber or
/// logger is already installed.
pub fn init(format: LogFormat) -> Result<(), SchemalyzeError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    };
    installed.map_err(|e| SchemalyzeError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| SchemalyzeError::Logging(e.to_string()))?;
    Ok(())
}
