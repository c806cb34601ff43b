//! Configuration management for perfcheck
//!
//! Configuration is read from a TOML file (`PERFCHECK_CONFIG_PATH`, or
//! `perfcheck.toml` in the working directory) and then overridden by
//! `PERFCHECK_<SECTION>_<KEY>` environment variables.

use crate::error::{PerfCheckError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENV_PREFIX: &str = "PERFCHECK_";
const CONFIG_PATH_VAR: &str = "PERFCHECK_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "perfcheck.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteFileConfig,
    pub perflog: PerfLogConfig,
    pub logging: LoggingConfig,
    pub judge: JudgeConfig,
}

/// Where the site description lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteFileConfig {
    pub path: PathBuf,
}

/// Perflog output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfLogConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub append: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<PathBuf>,
}

/// Judgment policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Overrides every check's own strictness when set
    pub strict: Option<bool>,
    /// Maximum number of instances judged at once in batch mode
    pub concurrency: usize,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for SiteFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/cyclone.toml"),
        }
    }
}

impl Default for PerfLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("perflogs"),
            append: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            strict: None,
            concurrency: 8,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = PerfCheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(PerfCheckError::config(
                format!("Invalid log format: {s}"),
                "logging.format",
            )),
        }
    }
}

impl Config {
    /// Load configuration from the default locations and the environment
    pub fn load() -> Result<Self> {
        let path = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };
        Self::load_from_file(path.as_deref())
    }

    /// Load configuration from an optional file, then apply environment overrides
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::parse_file(path)?
            }
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file without consulting the environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PerfCheckError::IoError {
            message: format!("Failed to read config file {}: {}", path.display(), e),
            source: Some(e),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `PERFCHECK_<SECTION>_<KEY>` overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        for (key, value) in env::vars() {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if key == CONFIG_PATH_VAR {
                continue;
            }

            match name {
                "SITE_PATH" => self.site.path = PathBuf::from(value),
                "PERFLOG_ENABLED" => self.perflog.enabled = parse_bool(&value, "perflog.enabled")?,
                "PERFLOG_DIRECTORY" => self.perflog.directory = PathBuf::from(value),
                "PERFLOG_APPEND" => self.perflog.append = parse_bool(&value, "perflog.append")?,
                "LOGGING_LEVEL" => self.logging.level = value,
                "LOGGING_FORMAT" => self.logging.format = value.parse()?,
                "LOGGING_FILE_PATH" => self.logging.file_path = Some(PathBuf::from(value)),
                "JUDGE_STRICT" => self.judge.strict = Some(parse_bool(&value, "judge.strict")?),
                "JUDGE_CONCURRENCY" => {
                    self.judge.concurrency = value.parse().map_err(|_| {
                        PerfCheckError::config(
                            format!("Invalid concurrency: {value}"),
                            "judge.concurrency",
                        )
                    })?
                }
                other => debug!("Ignoring unknown environment override {}{}", ENV_PREFIX, other),
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(PerfCheckError::config(
                    format!("Invalid log level: {other}"),
                    "logging.level",
                ))
            }
        }

        if self.judge.concurrency == 0 {
            return Err(PerfCheckError::config(
                "concurrency must be at least 1",
                "judge.concurrency",
            ));
        }

        if self.site.path.as_os_str().is_empty() {
            return Err(PerfCheckError::config("site path is empty", "site.path"));
        }

        if self.perflog.enabled && self.perflog.directory.as_os_str().is_empty() {
            return Err(PerfCheckError::config(
                "perflog directory is empty",
                "perflog.directory",
            ));
        }

        Ok(())
    }

    /// Write a commented sample configuration file with the defaults
    pub fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let body = toml::to_string_pretty(&Config::default()).map_err(|e| {
            PerfCheckError::InternalError {
                message: format!("Failed to serialize sample config: {e}"),
                component: Some("config".to_string()),
            }
        })?;
        let content = format!(
            "# perfcheck configuration\n\
             # Every key can be overridden with PERFCHECK_<SECTION>_<KEY>.\n\n{body}"
        );
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

fn parse_bool(value: &str, field: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PerfCheckError::config(
            format!("Invalid boolean: {value}"),
            field,
        )),
    }
}
