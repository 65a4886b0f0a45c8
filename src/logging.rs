use crate::config::LoggingConfig;
use crate::error::{Result, ServerError};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the logging system with both console and file output.
///
/// The returned guard flushes the file writer on drop; hold it for the process lifetime.
/// Fails when the log directory or file cannot be created, or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    // Ensure logs directory exists
    fs::create_dir_all(&config.directory)?;

    // Create a non-blocking file appender for daily log rotation
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_name)
        .build(&config.directory)
        .map_err(|e| ServerError::Config(format!("cannot open log file: {e}")))?;
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Create a JSON layer for file logging
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // Create a formatted layer for console logging
    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stdout);

    // Respect RUST_LOG if set; otherwise use the configured filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| ServerError::Config(format!("logging already initialized: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unusable_log_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let config = LoggingConfig {
            directory: blocker.join("logs"),
            ..LoggingConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(ServerError::Io(_))));
    }
}
