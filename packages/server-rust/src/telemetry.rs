//! Structured logging and metrics exporter initialisation.

use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::ValueEnum;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Logging and metrics settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info,dataservice_server=debug`.
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Address for the Prometheus scrape endpoint; `None` disables it.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Compact,
            metrics_addr: None,
        }
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber was already installed elsewhere.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
    /// The Prometheus exporter could not be installed.
    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] BuildError),
}

/// Installs the global subscriber and, if configured, the metrics exporter.
///
/// Only the first call installs anything; later calls succeed without
/// touching global state.
///
/// # Errors
///
/// Returns [`TelemetryError`] if the filter is invalid or either global
/// recorder cannot be installed.
pub fn initialise(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            install_subscriber(config)?;
            if let Some(addr) = config.metrics_addr {
                PrometheusBuilder::new().with_http_listener(addr).install()?;
                tracing::info!(%addr, "prometheus exporter listening");
            }
            Ok(())
        })
        .copied()
}

fn install_subscriber(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(io::stderr)
            // Colour only on interactive terminals.
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
