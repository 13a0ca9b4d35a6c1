//! Logging initialization.
//!
//! With `INSTALL_FLOW_LOG_DIR` set, logs go to a daily rolling file in that
//! directory. Otherwise they go to stderr.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServiceConfig;

const LOG_FILE_PREFIX: &str = "install-flow.log";

/// Keeps the file writer alive. Dropping it flushes buffered lines.
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
}

/// Filter from `RUST_LOG` when set, else the configured level.
fn build_filter(config: &ServiceConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &ServiceConfig) -> Result<LoggingHandle> {
    let filter = build_filter(config);

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .try_init()?;

        Ok(LoggingHandle {
            _guard: Some(guard),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;

        Ok(LoggingHandle {
            _guard: None,
        })
    }
}
