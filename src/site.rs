//! Site configuration: systems, partitions and programming environments
//!
//! The site file describes what the cluster offers. Checks name the
//! partitions and environments they support with patterns; this module
//! expands those patterns into concrete `(partition, environ)` pairs.

use crate::error::{PerfCheckError, Result};
use crate::reference::split_fullname;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub systems: Vec<SystemConfig>,
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    #[serde(default)]
    pub descr: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default = "default_modules_system")]
    pub modules_system: String,
    pub partitions: Vec<PartitionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    #[serde(default)]
    pub descr: String,
    #[serde(default = "default_local")]
    pub scheduler: String,
    #[serde(default = "default_local")]
    pub launcher: String,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub environs: Vec<String>,
    #[serde(default)]
    pub max_jobs: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default = "default_num_devices")]
    pub num_devices: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    #[serde(default)]
    pub target_systems: Vec<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub cxx: Option<String>,
    #[serde(default)]
    pub ftn: Option<String>,
}

fn default_modules_system() -> String {
    "nomod".to_string()
}

fn default_local() -> String {
    "local".to_string()
}

fn default_num_devices() -> u32 {
    1
}

/// A partition together with the system that owns it
#[derive(Debug, Clone, Copy)]
pub struct PartitionRef<'a> {
    pub system: &'a SystemConfig,
    pub partition: &'a PartitionConfig,
}

impl<'a> PartitionRef<'a> {
    pub fn fullname(&self) -> String {
        format!("{}:{}", self.system.name, self.partition.name)
    }
}

impl EnvironmentConfig {
    /// An empty target list means the environment is valid everywhere
    pub fn targets(&self, system: &str) -> bool {
        self.target_systems.is_empty() || self.target_systems.iter().any(|s| s == system)
    }
}

impl PartitionConfig {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Total devices of one kind, e.g. `gpu`
    pub fn device_count(&self, kind: &str) -> u32 {
        self.devices
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.num_devices)
            .sum()
    }
}

impl SiteConfig {
    /// Load and validate a site file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PerfCheckError::IoError {
            message: format!("Failed to read site file {}: {}", path.display(), e),
            source: Some(e),
        })?;
        let site = Self::from_toml_str(&content)?;
        info!(
            "Loaded site configuration from {} ({} systems)",
            path.display(),
            site.systems.len()
        );
        Ok(site)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let site: SiteConfig = toml::from_str(content)?;
        site.validate()?;
        Ok(site)
    }

    pub fn validate(&self) -> Result<()> {
        if self.systems.is_empty() {
            return Err(PerfCheckError::config("no systems declared", "systems"));
        }

        let mut env_names = HashSet::new();
        for env in &self.environments {
            if !env_names.insert(env.name.as_str()) {
                return Err(PerfCheckError::config(
                    format!("environment '{}' declared twice", env.name),
                    "environments",
                ));
            }
        }

        let mut system_names = HashSet::new();
        for system in &self.systems {
            if !system_names.insert(system.name.as_str()) {
                return Err(PerfCheckError::config(
                    format!("system '{}' declared twice", system.name),
                    "systems",
                ));
            }
            if system.name.contains(':') || system.name == "*" {
                return Err(PerfCheckError::config(
                    format!("invalid system name '{}'", system.name),
                    "systems.name",
                ));
            }
            for host in &system.hostnames {
                Regex::new(host).map_err(|e| {
                    PerfCheckError::config(
                        format!("invalid hostname pattern '{host}': {e}"),
                        "systems.hostnames",
                    )
                })?;
            }

            let mut partition_names = HashSet::new();
            for partition in &system.partitions {
                if !partition_names.insert(partition.name.as_str()) {
                    return Err(PerfCheckError::config(
                        format!(
                            "partition '{}' declared twice in system '{}'",
                            partition.name, system.name
                        ),
                        "systems.partitions",
                    ));
                }
                for environ in &partition.environs {
                    let declared = self
                        .environments
                        .iter()
                        .find(|e| &e.name == environ)
                        .ok_or_else(|| {
                            PerfCheckError::config(
                                format!(
                                    "partition '{}:{}' uses undeclared environment '{}'",
                                    system.name, partition.name, environ
                                ),
                                "systems.partitions.environs",
                            )
                        })?;
                    if !declared.targets(&system.name) {
                        return Err(PerfCheckError::config(
                            format!(
                                "environment '{}' does not target system '{}'",
                                environ, system.name
                            ),
                            "environments.target_systems",
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn system(&self, name: &str) -> Option<&SystemConfig> {
        self.systems.iter().find(|s| s.name == name)
    }

    /// Look up a partition by `system:partition`
    pub fn partition(&self, fullname: &str) -> Option<PartitionRef<'_>> {
        let (system, partition) = split_fullname(fullname).ok()?;
        let system = self.system(system)?;
        let partition = system.partitions.iter().find(|p| p.name == partition)?;
        Some(PartitionRef { system, partition })
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Every partition of every system
    pub fn partitions(&self) -> impl Iterator<Item = PartitionRef<'_>> {
        self.systems.iter().flat_map(|system| {
            system
                .partitions
                .iter()
                .map(move |partition| PartitionRef { system, partition })
        })
    }

    /// Partitions matched by a check's valid-systems patterns.
    ///
    /// Accepted forms: `*`, `system`, `system:*`, `system:partition`.
    pub fn expand_valid_systems(&self, patterns: &[String]) -> Vec<PartitionRef<'_>> {
        let matched: Vec<_> = self
            .partitions()
            .filter(|p| patterns.iter().any(|pat| matches_system_pattern(pat, p)))
            .collect();
        debug!(
            "Valid systems {:?} matched {} partitions",
            patterns,
            matched.len()
        );
        matched
    }

    /// The partition's environs accepted by a check's environ patterns
    pub fn environs_for<'a>(
        &self,
        partition: &PartitionRef<'a>,
        patterns: &[String],
    ) -> Vec<&'a str> {
        partition
            .partition
            .environs
            .iter()
            .filter(|env| patterns.iter().any(|pat| pat == "*" || pat == *env))
            .map(String::as_str)
            .collect()
    }

    /// Whether `host` is one of the system's front-end hosts
    pub fn hostname_matches(&self, system: &str, host: &str) -> bool {
        self.system(system).is_some_and(|s| {
            s.hostnames
                .iter()
                .filter_map(|pattern| Regex::new(pattern).ok())
                .any(|re| re.is_match(host))
        })
    }

    /// First system whose hostname patterns match `host`
    pub fn detect_system(&self, host: &str) -> Option<&SystemConfig> {
        self.systems
            .iter()
            .find(|s| self.hostname_matches(&s.name, host))
    }
}

fn matches_system_pattern(pattern: &str, partition: &PartitionRef<'_>) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.split_once(':') {
        None => pattern == partition.system.name,
        Some((system, "*")) => system == partition.system.name,
        Some((system, name)) => system == partition.system.name && name == partition.partition.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
[[systems]]
name = "cyclone"
hostnames = ["front0[0-9]"]
modules_system = "lmod"

[[systems.partitions]]
name = "login"
environs = ["PrgEnv-gnu-nompi-nocuda"]

[[systems.partitions]]
name = "cpu"
scheduler = "slurm"
launcher = "srun"
environs = ["PrgEnv-gnu-nompi-nocuda", "PrgEnv-gnu-nocuda"]
max_jobs = 16

[[systems.partitions]]
name = "gpu"
scheduler = "slurm"
launcher = "srun"
environs = ["PrgEnv-gnu-nocuda"]
features = ["gpu"]
devices = [{ type = "gpu", arch = "sm_70", num_devices = 4 }]

[[environments]]
name = "PrgEnv-gnu-nompi-nocuda"
target_systems = ["cyclone"]
modules = ["GCC/12.2.0"]
cc = "gcc"

[[environments]]
name = "PrgEnv-gnu-nocuda"
target_systems = ["cyclone"]
modules = ["OpenMPI/4.1.4-GCC-12.2.0"]
cc = "mpicc"
"#;

    fn site() -> SiteConfig {
        SiteConfig::from_toml_str(SITE).unwrap()
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_and_lookup() {
        let site = site();
        let gpu = site.partition("cyclone:gpu").unwrap();
        assert_eq!(gpu.fullname(), "cyclone:gpu");
        assert!(gpu.partition.has_feature("gpu"));
        assert_eq!(gpu.partition.device_count("gpu"), 4);
        assert_eq!(site.partition("cyclone:cpu").unwrap().partition.max_jobs, Some(16));
        assert!(site.partition("cyclone:bigmem").is_none());
        assert!(site.partition("cyclone").is_none());
        assert_eq!(site.environment("PrgEnv-gnu-nocuda").unwrap().cc.as_deref(), Some("mpicc"));
    }

    #[test]
    fn test_expand_valid_systems() {
        let site = site();
        assert_eq!(site.expand_valid_systems(&patterns(&["*"])).len(), 3);
        assert_eq!(site.expand_valid_systems(&patterns(&["cyclone"])).len(), 3);
        assert_eq!(site.expand_valid_systems(&patterns(&["cyclone:*"])).len(), 3);
        let names: Vec<String> = site
            .expand_valid_systems(&patterns(&["cyclone:login", "cyclone:cpu"]))
            .iter()
            .map(PartitionRef::fullname)
            .collect();
        assert_eq!(names, vec!["cyclone:login", "cyclone:cpu"]);
        assert!(site.expand_valid_systems(&patterns(&["archer2:compute"])).is_empty());
    }

    #[test]
    fn test_environs_for() {
        let site = site();
        let cpu = site.partition("cyclone:cpu").unwrap();
        assert_eq!(site.environs_for(&cpu, &patterns(&["*"])).len(), 2);
        assert_eq!(
            site.environs_for(&cpu, &patterns(&["PrgEnv-gnu-nocuda", "PrgEnv-intel"])),
            vec!["PrgEnv-gnu-nocuda"]
        );
    }

    #[test]
    fn test_hostname_detection() {
        let site = site();
        assert!(site.hostname_matches("cyclone", "front02"));
        assert!(!site.hostname_matches("cyclone", "laptop"));
        assert_eq!(site.detect_system("front02").unwrap().name, "cyclone");
        assert!(site.detect_system("laptop").is_none());
    }

    #[test]
    fn test_validation_rejects_undeclared_environ() {
        let broken = SITE.replace(
            "environs = [\"PrgEnv-gnu-nompi-nocuda\"]",
            "environs = [\"PrgEnv-cray\"]",
        );
        let err = SiteConfig::from_toml_str(&broken).unwrap_err();
        assert!(err.to_string().contains("PrgEnv-cray"));
    }

    #[test]
    fn test_validation_rejects_duplicate_partition() {
        let mut site = site();
        let dup = site.systems[0].partitions[0].clone();
        site.systems[0].partitions.push(dup);
        assert!(site.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_foreign_environment() {
        let mut site = site();
        site.environments[0].target_systems = vec!["archer2".to_string()];
        assert!(site.validate().is_err());
    }
}
