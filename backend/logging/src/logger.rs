//! Structured Logger
//!
//! Wraps `tracing` to provide console output, optional rolling NDJSON files,
//! and environment-based level control.

use parlor_config::LoggingConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// File name prefix for rolling log files.
const LOG_FILE_NAME: &str = "parlor.log";

/// Build the level filter. `RUST_LOG` wins over the configured level.
pub fn build_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(level))
}

fn configured_filter(level: Option<&str>) -> EnvFilter {
    let level = level.map(str::trim).filter(|l| !l.is_empty()).unwrap_or("info");
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global structured logger.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place and return `false`.
pub fn init_logger(config: &LoggingConfig) -> bool {
    let env_filter = build_filter(config.level.as_deref());

    let console_layer = if config.json.unwrap_or(false) {
        fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_ansi(true)
            .boxed()
    };

    // Rolling file appender: writes NDJSON to `<dir>/parlor.log.YYYY-MM-DD`
    let file_layer = config.dir.as_ref().map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
        fmt::layer()
            .json()
            .with_writer(appender)
            .with_ansi(false)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok()
}
