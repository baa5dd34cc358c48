//! Subscriber setup for the `seoflow` binary.
//!
//! Events go to stderr (pretty or JSON) and, unless disabled, to a
//! daily-rotated file under `<root>/logs/`. The filter is the resolved
//! `Config::log_level`, so `--log-level` beats `SEOFLOW_LOG`, which beats
//! the file.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{Config, LogFormat};

pub const LOG_FILE_PREFIX: &str = "seoflow.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the event filter from an explicit directive.
pub fn build_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log filter directive '{}'", directive))
}

/// The event filter for a resolved configuration.
pub fn config_filter(config: &Config) -> Result<EnvFilter> {
    build_filter(&config.log_level)
}

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = config_filter(config)?;

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(config.log_format)];
    let mut guard = None;

    if config.log_to_file {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", config.log_dir.display())
        })?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
        guard = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
