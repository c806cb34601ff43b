//! Structured logging setup for perfcheck
//!
//! Installs a tracing subscriber in one of three formats, writing either
//! to stderr or to an append-only log file.

use crate::config::{Config, LogFormat};
use crate::error::{PerfCheckError, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Logging system manager
#[derive(Debug)]
pub struct LoggingSystem {
    config: Config,
    log_file: Option<Arc<File>>,
}

impl LoggingSystem {
    /// Create a new logging system with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            log_file: None,
        }
    }

    /// Initialize the tracing subscriber
    ///
    /// A subscriber that is already installed (as in tests) is left in place.
    pub async fn initialize(&mut self) -> Result<()> {
        let log_level = self.parse_log_level(&self.config.logging.level)?;
        let env_filter = self.env_filter(log_level)?;

        if let Some(file_path) = self.config.logging.file_path.clone() {
            self.log_file = Some(Arc::new(open_log_file(&file_path).await?));
        }

        let result = match (self.config.logging.format, self.log_file.clone()) {
            (LogFormat::Json, Some(file)) => Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(file)
                        .with_current_span(false)
                        .with_span_list(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init(),
            (LogFormat::Json, None) => Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(false)
                        .with_span_list(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true),
                )
                .try_init(),
            (LogFormat::Pretty, Some(file)) => Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init(),
            (LogFormat::Pretty, None) => Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true)
                        .with_file(false)
                        .with_line_number(false)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init(),
            (LogFormat::Compact, Some(file)) => Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(true),
                )
                .try_init(),
            (LogFormat::Compact, None) => Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_target(false),
                )
                .try_init(),
        };

        if let Err(e) = result {
            warn!(
                "Failed to initialize tracing subscriber (may already be set): {}",
                e
            );
        }

        info!(
            level = %self.config.logging.level,
            format = ?self.config.logging.format,
            "Logging initialized"
        );
        Ok(())
    }

    /// Build the filter: `RUST_LOG` wins, otherwise the configured level
    fn env_filter(&self, level: Level) -> Result<EnvFilter> {
        let directive: Directive = format!("perfcheck={}", level.as_str().to_lowercase())
            .parse()
            .map_err(|e| PerfCheckError::InternalError {
                message: format!("Invalid filter directive: {e}"),
                component: Some("logging".to_string()),
            })?;

        Ok(EnvFilter::builder()
            .with_default_directive(Level::WARN.into())
            .from_env_lossy()
            .add_directive(directive))
    }

    /// Parse log level string to tracing Level
    fn parse_log_level(&self, level_str: &str) -> Result<Level> {
        match level_str.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => Err(PerfCheckError::config(
                format!("Invalid log level: {level_str}"),
                "logging.level",
            )),
        }
    }

    /// Flush the log file, if any
    pub async fn flush(&self) -> Result<()> {
        if let Some(file) = &self.log_file {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Shutdown the logging system
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down logging system");
        self.flush().await
    }
}

async fn open_log_file(file_path: &Path) -> Result<File> {
    if let Some(parent) = file_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PerfCheckError::IoError {
                message: format!("Failed to create log directory: {e}"),
                source: Some(e),
            })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .map_err(|e| PerfCheckError::IoError {
            message: format!("Failed to open log file {}: {e}", file_path.display()),
            source: Some(e),
        })
}

/// Health check for logging system
pub async fn check_logging_health(config: &Config) -> Result<bool> {
    if let Some(ref log_file_path) = config.logging.file_path {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)
        {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Logging health check failed: {}", e);
                Ok(false)
            }
        }
    } else {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_log_level() {
        let logging_system = LoggingSystem::new(Config::default());

        assert!(matches!(logging_system.parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(logging_system.parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(logging_system.parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(logging_system.parse_log_level("Warn"), Ok(Level::WARN)));
        assert!(matches!(logging_system.parse_log_level("error"), Ok(Level::ERROR)));
        assert!(logging_system.parse_log_level("invalid").is_err());
    }

    #[tokio::test]
    async fn test_file_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("perfcheck.log");

        let mut config = Config::default();
        config.logging.file_path = Some(log_path.clone());
        config.logging.format = LogFormat::Compact;

        let mut logging_system = LoggingSystem::new(config);
        logging_system.initialize().await.unwrap();
        logging_system.shutdown().await.unwrap();

        assert!(log_path.exists());
    }

    #[tokio::test]
    async fn test_logging_health_check_console() {
        let health = check_logging_health(&Config::default()).await.unwrap();
        assert!(health);
    }

    #[tokio::test]
    async fn test_logging_health_check_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.logging.file_path = Some(temp_dir.path().join("test.log"));

        assert!(check_logging_health(&config).await.unwrap());
    }

    #[tokio::test]
    async fn test_logging_health_check_invalid_file() {
        let mut config = Config::default();
        config.logging.file_path = Some(PathBuf::from("/invalid/path/test.log"));

        assert!(!check_logging_health(&config).await.unwrap());
    }
}
