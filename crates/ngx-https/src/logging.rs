use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, Logging};

/// Builds the filter: `RUST_LOG` when set, the configured level otherwise
fn env_filter(logging: &Logging) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(&logging.level).into())
        .from_env_lossy()
}

/// Creates a tracing/logging subscriber based on the configuration provided.
///
/// Logs go to stderr; stdout carries the operator report.
pub fn setup_logging(logging: &Logging) {
    if logging.format == LogFormat::Json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(logging))
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter(logging))
            .with_writer(std::io::stderr)
            .init();
    }
}
