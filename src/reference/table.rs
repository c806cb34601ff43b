//! Reference tables and the resolver that walks them

use super::entry::ReferenceEntry;
use super::selector::{Dimension, SelectorContext, SelectorValue};
use crate::error::ConfigurationError;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

/// Metric name -> reference, for one system scope
pub type MetricReferences = BTreeMap<String, ReferenceEntry>;

/// Scope (`system:partition`, `system` or `*`) -> metric references
pub type ScopedReferences = BTreeMap<String, MetricReferences>;

/// Outcome of a reference lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Found(&'a ReferenceEntry),
    NotFound(Miss),
}

impl<'a> Resolution<'a> {
    pub fn entry(&self) -> Option<&'a ReferenceEntry> {
        match self {
            Resolution::Found(entry) => Some(entry),
            Resolution::NotFound(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Where a lookup stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    /// No key (and no usable fallback) for a selector dimension
    Dimension {
        dimension: Dimension,
        value: Option<SelectorValue>,
    },
    /// No scope of the context's system declares the metric
    Metric { system: String, metric: String },
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Miss::Dimension {
                dimension,
                value: Some(value),
            } => write!(f, "no reference for {dimension}={value}"),
            Miss::Dimension {
                dimension,
                value: None,
            } => write!(f, "context has no {dimension} and no default is declared"),
            Miss::Metric { system, metric } => {
                write!(f, "no reference for metric '{metric}' on {system}")
            }
        }
    }
}

/// Static, immutable performance reference table.
///
/// Keys are tuples over `dimensions` (in declared order); each key maps to
/// references scoped by system. The system level is always last and is
/// matched most-specific first: `system:partition`, `system`, then `*`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceTable {
    dimensions: Vec<Dimension>,
    fallbacks: BTreeMap<Dimension, SelectorValue>,
    entries: BTreeMap<Vec<SelectorValue>, ScopedReferences>,
}

impl ReferenceTable {
    pub fn builder() -> ReferenceTableBuilder {
        ReferenceTableBuilder::default()
    }

    /// A table with no references; every lookup is `NotFound`
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn fallback(&self, dimension: Dimension) -> Option<&SelectorValue> {
        self.fallbacks.get(&dimension)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the reference for `metric` under `context`.
    ///
    /// A missing key at any level is a [`Resolution::NotFound`], never an error.
    pub fn resolve<'a>(&'a self, context: &SelectorContext, metric: &str) -> Resolution<'a> {
        let mut key: Vec<SelectorValue> = Vec::with_capacity(self.dimensions.len());

        for &dimension in &self.dimensions {
            let wanted = context.value(dimension);

            if let Some(value) = &wanted {
                if self.has_prefix(&key, value) {
                    key.push(value.clone());
                    continue;
                }
            }

            match self.fallbacks.get(&dimension) {
                Some(default) if self.has_prefix(&key, default) => {
                    debug!(
                        "No reference for {}={}, using default {}",
                        dimension,
                        wanted
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unset>".to_string()),
                        default
                    );
                    key.push(default.clone());
                }
                _ => {
                    trace!("Reference lookup for '{}' stopped at {}", metric, dimension);
                    return Resolution::NotFound(Miss::Dimension {
                        dimension,
                        value: wanted,
                    });
                }
            }
        }

        let scoped = match self.entries.get(&key) {
            Some(scoped) => scoped,
            None => {
                return Resolution::NotFound(Miss::Metric {
                    system: context.fullname(),
                    metric: metric.to_string(),
                })
            }
        };

        for scope in context.scopes() {
            if let Some(entry) = scoped.get(&scope).and_then(|metrics| metrics.get(metric)) {
                return Resolution::Found(entry);
            }
        }

        Resolution::NotFound(Miss::Metric {
            system: context.fullname(),
            metric: metric.to_string(),
        })
    }

    fn has_prefix(&self, prefix: &[SelectorValue], next: &SelectorValue) -> bool {
        self.entries.keys().any(|key| {
            key.len() > prefix.len() && key[..prefix.len()] == *prefix && key[prefix.len()] == *next
        })
    }

    /// Every entry as `(key, scope, metric, reference)`
    pub fn iter(&self) -> impl Iterator<Item = (&[SelectorValue], &str, &str, &ReferenceEntry)> {
        self.entries.iter().flat_map(|(key, scoped)| {
            scoped.iter().flat_map(move |(scope, metrics)| {
                metrics
                    .iter()
                    .map(move |(metric, entry)| (key.as_slice(), scope.as_str(), metric.as_str(), entry))
            })
        })
    }

    /// Validate every entry; see [`ReferenceEntry::validate`]
    pub fn validate(&self, strict: bool) -> Result<(), ConfigurationError> {
        for (_, _, metric, entry) in self.iter() {
            entry.validate(metric, strict)?;
        }
        Ok(())
    }
}

/// Builder for [`ReferenceTable`]
#[derive(Debug, Default)]
pub struct ReferenceTableBuilder {
    dimensions: Vec<Dimension>,
    fallbacks: BTreeMap<Dimension, SelectorValue>,
    entries: Vec<(Vec<SelectorValue>, String, String, ReferenceEntry)>,
}

impl ReferenceTableBuilder {
    /// Append a key dimension; order of calls is lookup order
    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    /// Declare the value substituted when a dimension's key is missing
    pub fn fallback(mut self, dimension: Dimension, value: impl Into<SelectorValue>) -> Self {
        self.fallbacks.insert(dimension, value.into());
        self
    }

    /// Add a reference for `metric` under `key` and system `scope`
    pub fn entry(
        mut self,
        key: &[SelectorValue],
        scope: &str,
        metric: &str,
        reference: ReferenceEntry,
    ) -> Self {
        self.entries
            .push((key.to_vec(), scope.to_string(), metric.to_string(), reference));
        self
    }

    pub fn build(self) -> Result<ReferenceTable, ConfigurationError> {
        if let Some(dim) = self
            .dimensions
            .iter()
            .find(|d| **d == Dimension::System)
        {
            return Err(ConfigurationError::InvalidKey {
                dimension: dim.to_string(),
                key: "system is always the innermost level".to_string(),
            });
        }

        for dim in self.fallbacks.keys() {
            if !self.dimensions.contains(dim) {
                return Err(ConfigurationError::InvalidKey {
                    dimension: dim.to_string(),
                    key: "fallback declared for an undeclared dimension".to_string(),
                });
            }
        }

        let mut entries: BTreeMap<Vec<SelectorValue>, ScopedReferences> = BTreeMap::new();
        for (key, scope, metric, reference) in self.entries {
            if key.len() != self.dimensions.len() {
                return Err(ConfigurationError::InvalidKey {
                    dimension: format!("{:?}", self.dimensions),
                    key: key
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("/"),
                });
            }
            if scope.is_empty() {
                return Err(ConfigurationError::InvalidKey {
                    dimension: Dimension::System.to_string(),
                    key: scope,
                });
            }
            entries
                .entry(key)
                .or_default()
                .entry(scope)
                .or_default()
                .insert(metric, reference);
        }

        Ok(ReferenceTable {
            dimensions: self.dimensions,
            fallbacks: self.fallbacks,
            entries,
        })
    }
}
