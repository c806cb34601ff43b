//! Error types for perfcheck
//!
//! Component errors (extraction, sanity, reference configuration) are kept
//! as their own enums so callers can match on them precisely; all of them
//! convert into [`PerfCheckError`] for propagation with `?`.

use thiserror::Error;

/// Main error type for perfcheck operations
#[derive(Debug, Error)]
pub enum PerfCheckError {
    #[error("Configuration error: {message}{}", field_suffix(.field))]
    ConfigError {
        message: String,
        field: Option<String>,
    },

    #[error("Reference configuration error: {0}")]
    Reference(#[from] ConfigurationError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Sanity check failed: {0}")]
    Sanity(#[from] SanityError),

    #[error("Unknown check: {name}")]
    UnknownCheck { name: String },

    #[error("IO error: {message}")]
    IoError {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Internal error in {}: {message}", .component.as_deref().unwrap_or("unknown"))]
    InternalError {
        message: String,
        component: Option<String>,
    },
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" (field: {f})"))
        .unwrap_or_default()
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, PerfCheckError>;

/// A reference entry that cannot be judged against
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("metric '{metric}' has expected value 0 with fractional tolerance")]
    ZeroExpected { metric: String },

    #[error("metric '{metric}' has a non-finite {what}: {value}")]
    NonFinite {
        metric: String,
        what: &'static str,
        value: f64,
    },

    #[error("metric '{metric}' has lower tolerance {value} above zero")]
    PositiveLower { metric: String, value: f64 },

    #[error("metric '{metric}' has upper tolerance {value} below zero")]
    NegativeUpper { metric: String, value: f64 },

    #[error("metric '{metric}' declares no tolerance but strict checking is requested")]
    Unbounded { metric: String },

    #[error("reference key '{key}' is not valid for dimension {dimension}")]
    InvalidKey { dimension: String, key: String },
}

/// Expected program output was absent or malformed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("pattern '{pattern}' did not match the output")]
    NoMatch { pattern: String },

    #[error("pattern '{pattern}' matched {matches} times, occurrence {index} requested")]
    OccurrenceOutOfRange {
        pattern: String,
        matches: usize,
        index: isize,
    },

    #[error("pattern '{pattern}' has no capture group {group}")]
    MissingGroup { pattern: String, group: String },

    #[error("could not convert '{text}' captured by '{pattern}' to a number")]
    Conversion { pattern: String, text: String },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("run produced no output named '{source_name}'")]
    MissingOutput { source_name: String },
}

/// A sanity assertion over program output failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SanityError {
    #[error("pattern '{pattern}' not found in output")]
    PatternNotFound { pattern: String },

    #[error("pattern '{pattern}' unexpectedly found in output")]
    PatternFound { pattern: String },

    #[error("pattern '{pattern}' matched {actual} times, expected {expected}")]
    CountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },

    #[error("line '{line}' contradicts the job layout: {reason}")]
    LayoutMismatch { line: String, reason: String },

    #[error("extracted value {actual} != {expected}")]
    ValueMismatch { expected: f64, actual: f64 },

    #[error("value {actual} outside reference band [{lower_bound}, {upper_bound}]")]
    OutOfBand {
        actual: f64,
        lower_bound: f64,
        upper_bound: f64,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl From<std::io::Error> for PerfCheckError {
    fn from(err: std::io::Error) -> Self {
        PerfCheckError::IoError {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<toml::de::Error> for PerfCheckError {
    fn from(err: toml::de::Error) -> Self {
        PerfCheckError::ConfigError {
            message: format!("Failed to parse TOML: {}", err.message()),
            field: None,
        }
    }
}

impl From<regex::Error> for PerfCheckError {
    fn from(err: regex::Error) -> Self {
        PerfCheckError::ConfigError {
            message: format!("Invalid regular expression: {err}"),
            field: None,
        }
    }
}

impl PerfCheckError {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, field: impl Into<String>) -> Self {
        PerfCheckError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Errors that abort one test instance but leave its siblings running
    pub fn is_instance_failure(&self) -> bool {
        matches!(
            self,
            PerfCheckError::Reference(_)
                | PerfCheckError::Extraction(_)
                | PerfCheckError::Sanity(_)
        )
    }

    /// Short label used in reports and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            PerfCheckError::ConfigError { .. } => "config",
            PerfCheckError::Reference(_) => "reference",
            PerfCheckError::Extraction(_) => "extraction",
            PerfCheckError::Sanity(_) => "sanity",
            PerfCheckError::UnknownCheck { .. } => "unknown-check",
            PerfCheckError::IoError { .. } => "io",
            PerfCheckError::InternalError { .. } => "internal",
        }
    }
}
