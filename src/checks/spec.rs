//! Immutable check definitions and their expansion into instances

use crate::error::{ConfigurationError, PerfCheckError, Result};
use crate::extraction::Extraction;
use crate::reference::{Dimension, ReferenceTable, SelectorContext, SelectorValue};
use crate::sanity::SanityCheck;
use crate::site::SiteConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which piece of run output a pattern reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputSource {
    Stdout,
    Stderr,
    /// Output of the build step
    BuildStdout,
    /// A file left in the stage directory, e.g. `md.log`
    File(String),
}

impl fmt::Display for OutputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSource::Stdout => f.write_str("stdout"),
            OutputSource::Stderr => f.write_str("stderr"),
            OutputSource::BuildStdout => f.write_str("build_stdout"),
            OutputSource::File(name) => f.write_str(name),
        }
    }
}

/// Restricts a sanity rule or perf pattern to instances with one parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub parameter: String,
    pub value: SelectorValue,
}

/// A parameterization axis of a check
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// Reference-table dimension fed by this parameter, if any
    pub dimension: Option<Dimension>,
    pub values: Vec<SelectorValue>,
}

impl Parameter {
    pub fn new<V: Into<SelectorValue>>(name: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.to_string(),
            dimension: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Feed this parameter into a reference dimension of the same values
    pub fn selecting(mut self, dimension: Dimension) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

/// A sanity check together with the output it reads
#[derive(Debug, Clone)]
pub struct SanityRule {
    pub check: SanityCheck,
    pub source: OutputSource,
    pub when: Option<Condition>,
}

impl SanityRule {
    pub fn new(check: SanityCheck) -> Self {
        Self {
            check,
            source: OutputSource::Stdout,
            when: None,
        }
    }

    pub fn reading(mut self, source: OutputSource) -> Self {
        self.source = source;
        self
    }

    pub fn when(mut self, parameter: &str, value: impl Into<SelectorValue>) -> Self {
        self.when = Some(Condition {
            parameter: parameter.to_string(),
            value: value.into(),
        });
        self
    }
}

/// A performance variable: metric name, unit and how to extract it
#[derive(Debug, Clone)]
pub struct PerfPattern {
    pub metric: String,
    pub unit: String,
    pub extraction: Extraction,
    pub source: OutputSource,
    pub when: Option<Condition>,
}

impl PerfPattern {
    pub fn new(metric: &str, unit: &str, extraction: Extraction) -> Self {
        Self {
            metric: metric.to_string(),
            unit: unit.to_string(),
            extraction,
            source: OutputSource::Stdout,
            when: None,
        }
    }

    pub fn reading(mut self, source: OutputSource) -> Self {
        self.source = source;
        self
    }

    pub fn when(mut self, parameter: &str, value: impl Into<SelectorValue>) -> Self {
        self.when = Some(Condition {
            parameter: parameter.to_string(),
            value: value.into(),
        });
        self
    }
}

/// Immutable definition of one regression check
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub name: String,
    pub descr: String,
    pub valid_systems: Vec<String>,
    pub valid_prog_environs: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub sanity: Vec<SanityRule>,
    pub perf_patterns: Vec<PerfPattern>,
    pub references: ReferenceTable,
    /// A failed verdict fails the instance only when set
    pub strict_check: bool,
    pub tags: BTreeSet<String>,
    pub maintainers: Vec<String>,
}

impl CheckSpec {
    pub fn builder(name: &str) -> CheckSpecBuilder {
        CheckSpecBuilder::new(name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validate the reference table under this check's strictness
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        self.references.validate(self.strict_check)
    }

    /// Every valid partition x environ x parameter combination on `site`
    pub fn instances(self: &Arc<Self>, site: &SiteConfig) -> Result<Vec<CheckInstance>> {
        let mut instances = Vec::new();
        let bindings = self.parameter_bindings();

        for partition in site.expand_valid_systems(&self.valid_systems) {
            let fullname = partition.fullname();
            for environ in site.environs_for(&partition, &self.valid_prog_environs) {
                for binding in &bindings {
                    instances.push(CheckInstance::new(
                        Arc::clone(self),
                        &fullname,
                        environ,
                        binding.clone(),
                    )?);
                }
            }
        }

        debug!("Check {} expanded into {} instances", self.name, instances.len());
        Ok(instances)
    }

    /// Cartesian product of parameter values, in declaration order
    fn parameter_bindings(&self) -> Vec<Vec<SelectorValue>> {
        self.parameters
            .iter()
            .fold(vec![Vec::new()], |acc, parameter| {
                acc.iter()
                    .flat_map(|prefix| {
                        parameter.values.iter().map(move |value| {
                            let mut binding = prefix.clone();
                            binding.push(value.clone());
                            binding
                        })
                    })
                    .collect()
            })
    }
}

/// Builder for [`CheckSpec`]
#[derive(Debug)]
pub struct CheckSpecBuilder {
    spec: CheckSpec,
}

impl CheckSpecBuilder {
    fn new(name: &str) -> Self {
        Self {
            spec: CheckSpec {
                name: name.to_string(),
                descr: String::new(),
                valid_systems: Vec::new(),
                valid_prog_environs: Vec::new(),
                parameters: Vec::new(),
                sanity: Vec::new(),
                perf_patterns: Vec::new(),
                references: ReferenceTable::empty(),
                strict_check: true,
                tags: BTreeSet::new(),
                maintainers: Vec::new(),
            },
        }
    }

    pub fn descr(mut self, descr: &str) -> Self {
        self.spec.descr = descr.to_string();
        self
    }

    pub fn valid_systems(mut self, systems: &[&str]) -> Self {
        self.spec.valid_systems = systems.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn valid_prog_environs(mut self, environs: &[&str]) -> Self {
        self.spec.valid_prog_environs = environs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.spec.parameters.push(parameter);
        self
    }

    pub fn sanity(mut self, rule: SanityRule) -> Self {
        self.spec.sanity.push(rule);
        self
    }

    pub fn perf(mut self, pattern: PerfPattern) -> Self {
        self.spec.perf_patterns.push(pattern);
        self
    }

    pub fn references(mut self, references: ReferenceTable) -> Self {
        self.spec.references = references;
        self
    }

    pub fn strict_check(mut self, strict: bool) -> Self {
        self.spec.strict_check = strict;
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.spec.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn maintainers(mut self, maintainers: &[&str]) -> Self {
        self.spec.maintainers = maintainers.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Finish the definition, rejecting conditions on undeclared parameters
    pub fn build(self) -> Result<CheckSpec> {
        let spec = self.spec;
        let conditions = spec
            .sanity
            .iter()
            .filter_map(|r| r.when.as_ref())
            .chain(spec.perf_patterns.iter().filter_map(|p| p.when.as_ref()));

        for condition in conditions {
            let declared = spec
                .parameter(&condition.parameter)
                .is_some_and(|p| p.values.contains(&condition.value));
            if !declared {
                return Err(PerfCheckError::config(
                    format!(
                        "check {} has a condition on {}={} which is not a declared parameter value",
                        spec.name, condition.parameter, condition.value
                    ),
                    "parameters",
                ));
            }
        }

        if spec.valid_systems.is_empty() || spec.valid_prog_environs.is_empty() {
            return Err(PerfCheckError::config(
                format!("check {} declares no valid systems or environs", spec.name),
                "valid_systems",
            ));
        }

        Ok(spec)
    }
}

/// One check bound to a partition, an environ and one value per parameter
#[derive(Debug, Clone)]
pub struct CheckInstance {
    spec: Arc<CheckSpec>,
    binding: Vec<SelectorValue>,
    context: SelectorContext,
}

impl CheckInstance {
    /// Bind `spec` to one run. `binding` holds one value per declared parameter.
    pub fn new(
        spec: Arc<CheckSpec>,
        fullname: &str,
        environ: &str,
        binding: Vec<SelectorValue>,
    ) -> Result<Self> {
        if binding.len() != spec.parameters.len() {
            return Err(PerfCheckError::config(
                format!(
                    "check {} takes {} parameters, {} given",
                    spec.name,
                    spec.parameters.len(),
                    binding.len()
                ),
                "parameters",
            ));
        }

        let mut context = SelectorContext::new(fullname, environ)?;
        for (parameter, value) in spec.parameters.iter().zip(&binding) {
            if let Some(dimension) = parameter.dimension {
                context = context.with(dimension, value.clone());
            }
        }

        Ok(Self {
            spec,
            binding,
            context,
        })
    }

    /// Bind from `name=value` pairs; every parameter must be given
    pub fn from_pairs(
        spec: Arc<CheckSpec>,
        fullname: &str,
        environ: &str,
        pairs: &[(String, String)],
    ) -> Result<Self> {
        let mut binding = Vec::with_capacity(spec.parameters.len());
        for parameter in &spec.parameters {
            let raw = pairs
                .iter()
                .find(|(name, _)| *name == parameter.name)
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    PerfCheckError::config(
                        format!("check {} needs parameter '{}'", spec.name, parameter.name),
                        "parameters",
                    )
                })?;
            let value = SelectorValue::parse(raw);
            if !parameter.values.contains(&value) {
                return Err(PerfCheckError::config(
                    format!(
                        "'{}' is not a value of parameter '{}' of check {}",
                        raw, parameter.name, spec.name
                    ),
                    "parameters",
                ));
            }
            binding.push(value);
        }

        if let Some((name, _)) = pairs.iter().find(|(name, _)| spec.parameter(name).is_none()) {
            return Err(PerfCheckError::config(
                format!("check {} has no parameter '{}'", spec.name, name),
                "parameters",
            ));
        }

        Self::new(spec, fullname, environ, binding)
    }

    pub fn spec(&self) -> &CheckSpec {
        &self.spec
    }

    pub fn context(&self) -> &SelectorContext {
        &self.context
    }

    /// Value bound to the named parameter
    pub fn parameter(&self, name: &str) -> Option<&SelectorValue> {
        self.spec
            .parameters
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| self.binding.get(i))
    }

    fn applies(&self, condition: &Option<Condition>) -> bool {
        match condition {
            None => true,
            Some(c) => self.parameter(&c.parameter) == Some(&c.value),
        }
    }

    /// Sanity rules that apply to this instance
    pub fn sanity_rules(&self) -> impl Iterator<Item = &SanityRule> {
        self.spec.sanity.iter().filter(|r| self.applies(&r.when))
    }

    /// Perf patterns that apply to this instance
    pub fn perf_patterns(&self) -> impl Iterator<Item = &PerfPattern> {
        self.spec.perf_patterns.iter().filter(|p| self.applies(&p.when))
    }

    /// `Name %param=value ... @system:partition+environ`
    pub fn check_info(&self) -> String {
        let mut info = self.spec.name.clone();
        for (parameter, value) in self.spec.parameters.iter().zip(&self.binding) {
            info.push_str(&format!(" %{}={}", parameter.name, value));
        }
        info.push_str(&format!(
            " @{}+{}",
            self.context.fullname(),
            self.context.environ()
        ));
        info
    }
}

impl fmt::Display for CheckInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.check_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceEntry;

    const SITE: &str = r#"
[[systems]]
name = "cyclone"
hostnames = ["front02"]

[[systems.partitions]]
name = "cpu"
scheduler = "slurm"
launcher = "srun"
environs = ["PrgEnv-gnu-nocuda", "PrgEnv-intel"]

[[systems.partitions]]
name = "gpu"
scheduler = "slurm"
launcher = "srun"
environs = ["PrgEnv-gnu"]

[[environments]]
name = "PrgEnv-gnu-nocuda"

[[environments]]
name = "PrgEnv-intel"

[[environments]]
name = "PrgEnv-gnu"
"#;

    fn collective() -> Arc<CheckSpec> {
        let references = ReferenceTable::builder()
            .dimension(Dimension::Benchmark)
            .dimension(Dimension::NumNodes)
            .entry(
                &["mpi.collective.osu_allreduce".into(), 3u32.into()],
                "cyclone:cpu",
                "latency",
                ReferenceEntry::new(2.79, None, Some(0.1), "us"),
            )
            .build()
            .unwrap();

        Arc::new(
            CheckSpec::builder("OsuCollectiveCheck")
                .valid_systems(&["cyclone:cpu"])
                .valid_prog_environs(&["PrgEnv-gnu-nocuda"])
                .parameter(
                    Parameter::new(
                        "benchmark",
                        ["mpi.collective.osu_alltoall", "mpi.collective.osu_allreduce"],
                    )
                    .selecting(Dimension::Benchmark),
                )
                .parameter(Parameter::new("num_nodes", [3u32, 6]).selecting(Dimension::NumNodes))
                .perf(PerfPattern::new(
                    "latency",
                    "us",
                    Extraction::named(r"(?m)^8\s+(?P<lat>\S+)", "lat").unwrap(),
                ))
                .references(references)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_instances_are_cartesian_product() {
        let site = SiteConfig::from_toml_str(SITE).unwrap();
        let instances = collective().instances(&site).unwrap();
        assert_eq!(instances.len(), 4);

        let infos: Vec<String> = instances.iter().map(|i| i.check_info()).collect();
        assert!(infos.contains(
            &"OsuCollectiveCheck %benchmark=mpi.collective.osu_allreduce %num_nodes=6 @cyclone:cpu+PrgEnv-gnu-nocuda"
                .to_string()
        ));
    }

    #[test]
    fn test_instance_context_carries_dimensions() {
        let instance = CheckInstance::from_pairs(
            collective(),
            "cyclone:cpu",
            "PrgEnv-gnu-nocuda",
            &[
                ("benchmark".to_string(), "mpi.collective.osu_allreduce".to_string()),
                ("num_nodes".to_string(), "3".to_string()),
            ],
        )
        .unwrap();

        assert_eq!(
            instance.context().value(Dimension::NumNodes),
            Some(SelectorValue::Count(3))
        );
        assert_eq!(instance.parameter("num_nodes"), Some(&SelectorValue::Count(3)));
    }

    #[test]
    fn test_from_pairs_rejects_bad_values() {
        let spec = collective();
        let missing = CheckInstance::from_pairs(
            Arc::clone(&spec),
            "cyclone:cpu",
            "PrgEnv-gnu-nocuda",
            &[("num_nodes".to_string(), "3".to_string())],
        );
        assert!(missing.is_err());

        let undeclared = CheckInstance::from_pairs(
            spec,
            "cyclone:cpu",
            "PrgEnv-gnu-nocuda",
            &[
                ("benchmark".to_string(), "mpi.collective.osu_allreduce".to_string()),
                ("num_nodes".to_string(), "4".to_string()),
            ],
        );
        assert!(undeclared.is_err());
    }

    #[test]
    fn test_conditional_patterns() {
        let spec = Arc::new(
            CheckSpec::builder("OsuPt2ptCheck")
                .valid_systems(&["cyclone:cpu"])
                .valid_prog_environs(&["*"])
                .parameter(Parameter::new("benchmark", ["bw", "latency"]))
                .perf(
                    PerfPattern::new("bandwidth", "MB/s", Extraction::named(r"(?P<v>\S+)", "v").unwrap())
                        .when("benchmark", "bw"),
                )
                .perf(
                    PerfPattern::new("latency", "us", Extraction::named(r"(?P<v>\S+)", "v").unwrap())
                        .when("benchmark", "latency"),
                )
                .build()
                .unwrap(),
        );

        let site = SiteConfig::from_toml_str(SITE).unwrap();
        let instances = spec.instances(&site).unwrap();
        // cpu has two environs, two benchmarks each
        assert_eq!(instances.len(), 4);
        for instance in &instances {
            let metrics: Vec<&str> = instance.perf_patterns().map(|p| p.metric.as_str()).collect();
            assert_eq!(metrics.len(), 1);
        }
    }

    #[test]
    fn test_condition_on_undeclared_value_is_rejected() {
        let result = CheckSpec::builder("Broken")
            .valid_systems(&["*"])
            .valid_prog_environs(&["*"])
            .parameter(Parameter::new("lang", ["c"]))
            .sanity(SanityRule::new(SanityCheck::found("x").unwrap()).when("lang", "rust"))
            .build();
        assert!(result.is_err());
    }
}
