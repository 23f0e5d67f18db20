//! Logging setup with file rotation
//!
//! Dual-output logging: concise INFO on the console, detailed records in a
//! daily-rotated file under the configured log directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_directory: PathBuf,
    /// Level for file output; console always logs at INFO
    pub log_level: Level,
    /// Old rotated files beyond this count are deleted at startup
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("logs"),
            log_level: Level::DEBUG,
            max_files: 10,
        }
    }
}

impl LoggingConfig {
    pub fn from_config(log_directory: &Path, log_level: &str, max_files: u32) -> Self {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        Self {
            log_directory: log_directory.to_path_buf(),
            log_level: level,
            max_files,
        }
    }
}

/// Keep this alive for the whole program; dropping it flushes the file log.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Initialize console plus rotating-file logging.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let log_dir = expand_tilde(&config.log_directory);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "netstash.log");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(level_filter(config.log_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_filter(level_filter(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    cleanup_old_logs(&log_dir, config.max_files)?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Console-only logging for commands that run before config is loaded.
pub fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("netstash={}", level))
            .add_directive(format!("{}", level).parse().expect("static level directive"))
    })
}

/// Expand a leading tilde to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Delete the oldest rotated log files beyond `max_files`.
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("netstash.log"))
                .unwrap_or(false)
        })
        .collect();

    if logs.len() <= max_files as usize {
        return Ok(());
    }

    // Rotated names embed the date, so lexicographic order is age order
    logs.sort();
    let excess = logs.len() - max_files as usize;
    for path in logs.into_iter().take(excess) {
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!("Failed to remove old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_falls_back_to_info() {
        let config = LoggingConfig::from_config(Path::new("/tmp"), "nonsense", 5);
        assert_eq!(config.log_level, Level::INFO);
        let config = LoggingConfig::from_config(Path::new("/tmp"), "debug", 5);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde(Path::new("~/x"));
        assert!(!expanded.starts_with("~"));
        assert_eq!(expand_tilde(Path::new("/abs/x")), PathBuf::from("/abs/x"));
    }

    #[test]
    fn cleanup_keeps_newest_files() {
        let dir = tempfile::TempDir::new().unwrap();
        for day in 1..=5 {
            fs::write(
                dir.path().join(format!("netstash.log.2024-01-0{}", day)),
                "x",
            )
            .unwrap();
        }
        cleanup_old_logs(dir.path(), 2).unwrap();
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 2);
    }
}
