//! Check registry for lookup by name

use super::catalog;
use super::spec::CheckSpec;
use crate::error::{PerfCheckError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registered checks, keyed by name
#[derive(Debug, Default, Clone)]
pub struct CheckRegistry {
    checks: BTreeMap<String, Arc<CheckSpec>>,
}

impl CheckRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in Cyclone suite
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for check in catalog::all()? {
            registry.register(check);
        }
        debug!("Registered {} built-in checks", registry.len());
        Ok(registry)
    }

    /// Register a check, replacing any check of the same name
    pub fn register(&mut self, check: CheckSpec) {
        let name = check.name.clone();
        if self.checks.insert(name.clone(), Arc::new(check)).is_some() {
            warn!("Check {} registered twice; keeping the later definition", name);
        }
    }

    /// Look up a check by exact name
    pub fn get(&self, name: &str) -> Result<Arc<CheckSpec>> {
        self.checks
            .get(name)
            .cloned()
            .ok_or_else(|| PerfCheckError::UnknownCheck {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    /// Check names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.checks.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CheckSpec>> {
        self.checks.values()
    }

    /// Checks carrying `tag`
    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Arc<CheckSpec>> {
        self.iter().filter(move |check| check.has_tag(tag))
    }

    /// Validate every reference table, collecting the failures by check name
    pub fn validate(&self) -> Vec<(String, PerfCheckError)> {
        self.iter()
            .filter_map(|check| {
                check
                    .validate()
                    .err()
                    .map(|e| (check.name.clone(), PerfCheckError::from(e)))
            })
            .collect()
    }
}
