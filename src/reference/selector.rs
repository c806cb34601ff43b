//! Selector dimensions and the per-instance selector context

use crate::error::{PerfCheckError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One axis a reference table can be keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Programming environment name, e.g. `PrgEnv-gnu-nocuda`
    Environ,
    /// Benchmark variant or scenario, e.g. `mpi.pt2pt.osu_bw` or `nvme`
    Benchmark,
    /// Build flavour of a fixture, e.g. `cpu` or `cuda`
    BuildType,
    /// Number of nodes the instance runs on
    NumNodes,
    /// The `system:partition` the instance runs on
    System,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Environ => "environ",
            Dimension::Benchmark => "benchmark",
            Dimension::BuildType => "build_type",
            Dimension::NumNodes => "num_nodes",
            Dimension::System => "system",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = PerfCheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "environ" => Ok(Dimension::Environ),
            "benchmark" => Ok(Dimension::Benchmark),
            "build_type" => Ok(Dimension::BuildType),
            "num_nodes" => Ok(Dimension::NumNodes),
            "system" => Ok(Dimension::System),
            other => Err(PerfCheckError::ConfigError {
                message: format!("unknown selector dimension '{other}'"),
                field: None,
            }),
        }
    }
}

/// Value of one selector dimension
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorValue {
    Count(u32),
    Text(String),
}

impl SelectorValue {
    /// Parse a command-line style value; plain integers become counts
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(n) => SelectorValue::Count(n),
            Err(_) => SelectorValue::Text(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for SelectorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorValue::Count(n) => write!(f, "{n}"),
            SelectorValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SelectorValue {
    fn from(value: &str) -> Self {
        SelectorValue::Text(value.to_string())
    }
}

impl From<String> for SelectorValue {
    fn from(value: String) -> Self {
        SelectorValue::Text(value)
    }
}

impl From<u32> for SelectorValue {
    fn from(value: u32) -> Self {
        SelectorValue::Count(value)
    }
}

/// Run-time identity of one test instance.
///
/// Built once per instance; there are no setters, only the consuming
/// [`SelectorContext::with`] used while constructing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorContext {
    system: String,
    partition: String,
    environ: String,
    scale: BTreeMap<Dimension, SelectorValue>,
}

impl SelectorContext {
    /// Create a context from a `system:partition` name and an environ
    pub fn new(fullname: &str, environ: &str) -> Result<Self> {
        let (system, partition) = split_fullname(fullname)?;
        Ok(Self {
            system: system.to_string(),
            partition: partition.to_string(),
            environ: environ.to_string(),
            scale: BTreeMap::new(),
        })
    }

    /// Add a scale or variant parameter.
    ///
    /// `System` and `Environ` come from the constructor and are ignored here.
    pub fn with(mut self, dimension: Dimension, value: impl Into<SelectorValue>) -> Self {
        match dimension {
            Dimension::System | Dimension::Environ => {
                tracing::warn!("Ignoring {} override on selector context", dimension);
            }
            _ => {
                self.scale.insert(dimension, value.into());
            }
        }
        self
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn environ(&self) -> &str {
        &self.environ
    }

    /// `system:partition`
    pub fn fullname(&self) -> String {
        format!("{}:{}", self.system, self.partition)
    }

    /// Value this context carries for `dimension`, if any
    pub fn value(&self, dimension: Dimension) -> Option<SelectorValue> {
        match dimension {
            Dimension::System => Some(SelectorValue::Text(self.fullname())),
            Dimension::Environ => Some(SelectorValue::Text(self.environ.clone())),
            other => self.scale.get(&other).cloned(),
        }
    }

    /// Scale parameters in dimension order
    pub fn scale(&self) -> impl Iterator<Item = (Dimension, &SelectorValue)> {
        self.scale.iter().map(|(d, v)| (*d, v))
    }

    /// Reference scopes tried for this context, most specific first
    pub fn scopes(&self) -> [String; 3] {
        [self.fullname(), self.system.clone(), "*".to_string()]
    }
}

/// Split `system:partition`, rejecting empty halves
pub fn split_fullname(fullname: &str) -> Result<(&str, &str)> {
    match fullname.split_once(':') {
        Some((system, partition)) if !system.is_empty() && !partition.is_empty() => {
            Ok((system, partition))
        }
        _ => Err(PerfCheckError::ConfigError {
            message: format!("'{fullname}' is not of the form system:partition"),
            field: None,
        }),
    }
}
