use crate::config::settings::LogConfig;
use crate::models::{CallLog, PoolStatus};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info};
use serde_json;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global logger
///
/// Console output is always on. When `config.file` is set, logs are also
/// written to that file, rotated daily and kept for `config.max_days` days.
/// Keep the returned guard alive until exit so buffered file lines get flushed.
/// `log` records are bridged to tracing as well.
pub fn init_logger(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_ansi(true)
        .pretty();

    let (file_layer, guard) = match file_appender(config)? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the global logger")?;

    if let Some(file) = &config.file {
        info!("📝 Logging to {} (daily, keeping {} days)", file, config.max_days);
    }

    Ok(guard)
}

/// Daily-rotated appender for `config.file`, if one is configured
pub(crate) fn file_appender(config: &LogConfig) -> Result<Option<RollingFileAppender>> {
    let Some(file) = config.file.as_deref() else {
        return Ok(None);
    };

    let path = Path::new(file);
    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Log file has no file name: {}", file))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(config.max_days.max(1))
        .build(dir)
        .with_context(|| format!("Failed to open log file: {}", file))?;

    Ok(Some(appender))
}

/// Log a finished backend call at debug level
pub fn log_call(log_entry: &CallLog) -> Result<()> {
    let timestamp = Utc::now().to_rfc3339();
    let log_message =
        serde_json::to_string_pretty(log_entry).context("Failed to serialize call log")?;

    debug!("[{}] RPC CALL:\n{}", timestamp, log_message);

    Ok(())
}

/// Log a pool snapshot at debug level
pub fn log_pool_status(status: &PoolStatus) -> Result<()> {
    let log_message =
        serde_json::to_string_pretty(status).context("Failed to serialize pool status")?;

    debug!("📊 POOL STATUS ({}):\n{}", status.summary(), log_message);

    Ok(())
}

/// Log an error message
pub fn log_error(message: &str) {
    error!("{}", message);
}

/// Log an info message
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Convenience macro for logging finished backend calls
#[macro_export]
macro_rules! log_rpc_call {
    ($log_entry:expr) => {
        if let Err(e) = $crate::logging::log_call($log_entry) {
            eprintln!("Failed to log RPC call: {}", e);
        }
    };
}

/// Convenience macro for logging errors
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error(&format!($($arg)*));
    };
}

/// Convenience macro for logging info messages
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info(&format!($($arg)*));
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_no_file_configured() {
        let config = LogConfig::default();
        assert!(file_appender(&config).unwrap().is_none());
    }

    #[test]
    fn test_file_appender_creates_dated_file() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let config = LogConfig {
            file: Some(log_dir.join("edge.log").to_string_lossy().into_owned()),
            level: "info".to_string(),
            max_days: 3,
        };

        let mut appender = file_appender(&config).unwrap().unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("edge.log"));
    }

    #[test]
    fn test_log_call_serializes() {
        let entry = CallLog {
            uuid: "abc".to_string(),
            connection_id: 3,
            duration_ms: 12,
            error: None,
            discarded: false,
            timestamp: Utc::now(),
        };
        assert!(log_call(&entry).is_ok());
    }
}
