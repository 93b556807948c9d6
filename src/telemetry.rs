//! tracing subscriber setup for binaries and long-running callers.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// install the global subscriber.
///
/// RUST_LOG takes precedence over the configured filter. safe to call more
/// than once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match config.format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.with_target(true).try_init(),
    };
}
