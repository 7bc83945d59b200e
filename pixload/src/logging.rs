//! Logging setup.
//!
//! Structured `tracing` output to a log file (truncated at start) and to
//! stdout, filtered by `RUST_LOG` with a configurable default level.
//! Timestamps use the local UTC offset when it can be determined.

use std::fs;
use std::io;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "pixload.log";

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Keeps the non-blocking file writer alive. Dropping it flushes the log.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Installs the global subscriber.
///
/// Creates `log_dir` if needed and clears `log_file` from a previous run.
/// `default_level` applies when `RUST_LOG` is unset or invalid.
///
/// # Errors
///
/// Fails if the directory or file cannot be created, or if a global
/// subscriber is already installed.
pub fn init_logging(log_dir: &Path, log_file: &str, default_level: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    // Must be read before worker threads exist on some platforms
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_timer(OffsetTime::new(offset, Rfc3339))
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .with_timer(OffsetTime::new(offset, Rfc3339))
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_env_filter_falls_back_on_invalid_level() {
        // Must not panic on garbage input
        let _ = env_filter("[[not a filter");
        let _ = env_filter("debug");
    }

    #[test]
    fn test_init_creates_and_truncates_log_file() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("nested/logs");
        fs::create_dir_all(&log_dir).unwrap();
        fs::write(log_dir.join(DEFAULT_LOG_FILE), "old log data").unwrap();

        // A second install in the same process fails; the file work happens first
        let result = init_logging(&log_dir, DEFAULT_LOG_FILE, "info");
        assert!(log_dir.join(DEFAULT_LOG_FILE).exists());
        if result.is_ok() {
            tracing::info!("logging initialized");
        }
        drop(result);

        let contents = fs::read_to_string(log_dir.join(DEFAULT_LOG_FILE)).unwrap();
        assert!(!contents.contains("old log data"));
    }
}
