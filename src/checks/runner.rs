//! Judging finished runs: sanity, extraction, resolution and evaluation
//!
//! A single instance is judged synchronously by [`judge`]. [`Runner`]
//! judges many instances concurrently on the tokio runtime and appends
//! their perflog records; an error in one instance never affects another.

use super::spec::{CheckInstance, CheckSpec, OutputSource};
use crate::config::{Config, JudgeConfig};
use crate::error::{ExtractionError, PerfCheckError, Result, SanityError};
use crate::evaluation::{evaluate, Evaluation, Verdict};
use crate::perflog::{tool_version, PerfLogRecord, PerfLogSink};
use crate::reference::Resolution;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn};

/// Everything a finished run left behind
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub build_stdout: String,
    /// Extra files from the stage directory, by name
    pub files: BTreeMap<String, String>,
    pub job_id: Option<String>,
    pub completion_time: DateTime<Utc>,
}

impl RunOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            build_stdout: String::new(),
            files: BTreeMap::new(),
            job_id: None,
            completion_time: Utc::now(),
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_build_stdout(mut self, build_stdout: impl Into<String>) -> Self {
        self.build_stdout = build_stdout.into();
        self
    }

    pub fn with_file(mut self, name: &str, content: impl Into<String>) -> Self {
        self.files.insert(name.to_string(), content.into());
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_completion_time(mut self, completion_time: DateTime<Utc>) -> Self {
        self.completion_time = completion_time;
        self
    }

    /// The text a pattern reads
    pub fn text(&self, source: &OutputSource) -> std::result::Result<&str, ExtractionError> {
        match source {
            OutputSource::Stdout => Ok(&self.stdout),
            OutputSource::Stderr => Ok(&self.stderr),
            OutputSource::BuildStdout => Ok(&self.build_stdout),
            OutputSource::File(name) => self.files.get(name).map(String::as_str).ok_or_else(|| {
                ExtractionError::MissingOutput {
                    source_name: name.clone(),
                }
            }),
        }
    }
}

/// How strictly failed verdicts are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgePolicy {
    /// Overrides each check's own `strict_check` when set
    pub strict: Option<bool>,
}

impl JudgePolicy {
    pub fn is_strict(&self, check: &CheckSpec) -> bool {
        self.strict.unwrap_or(check.strict_check)
    }
}

impl From<&JudgeConfig> for JudgePolicy {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            strict: config.strict,
        }
    }
}

/// What happened to one performance variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetricOutcome {
    Judged(Evaluation),
    /// No reference applies; the value is recorded only
    Unjudged {
        metric: String,
        value: f64,
        unit: String,
        reason: String,
    },
}

impl MetricOutcome {
    pub fn metric(&self) -> &str {
        match self {
            MetricOutcome::Judged(evaluation) => &evaluation.metric,
            MetricOutcome::Unjudged { metric, .. } => metric,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            MetricOutcome::Judged(evaluation) => evaluation.measured,
            MetricOutcome::Unjudged { value, .. } => *value,
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            MetricOutcome::Judged(evaluation) => Some(evaluation.verdict),
            MetricOutcome::Unjudged { .. } => None,
        }
    }
}

/// Overall result of an instance that was judged without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstanceStatus {
    Passed,
    /// Some metric failed but the check is not strict
    PassedWithWarnings,
    PerformanceFailed,
}

impl InstanceStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, InstanceStatus::PerformanceFailed)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Passed => f.write_str("PASSED"),
            InstanceStatus::PassedWithWarnings => f.write_str("PASSED (with warnings)"),
            InstanceStatus::PerformanceFailed => f.write_str("FAILED (performance)"),
        }
    }
}

/// Judgment of one instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceReport {
    pub check: String,
    pub check_info: String,
    pub system: String,
    pub partition: String,
    pub environ: String,
    pub status: InstanceStatus,
    pub outcomes: Vec<MetricOutcome>,
    #[serde(skip)]
    pub records: Vec<PerfLogRecord>,
}

/// Judge one finished run of `instance`.
///
/// Sanity, extraction and reference configuration errors abort the
/// instance. A missing reference records the value without judgment and
/// an out-of-band value is a failed verdict, not an error.
pub fn judge(
    instance: &CheckInstance,
    output: &RunOutput,
    policy: &JudgePolicy,
) -> Result<InstanceReport> {
    let spec = instance.spec();
    let check_info = instance.check_info();
    let _span = info_span!("judge", check = %check_info).entered();

    for rule in instance.sanity_rules() {
        let text = output.text(&rule.source).map_err(SanityError::from)?;
        rule.check.check(text)?;
        debug!("Sanity {} on {} passed", rule.check.describe(), rule.source);
    }

    let strict = policy.is_strict(spec);
    let context = instance.context();
    let mut outcomes = Vec::new();
    let mut records = Vec::new();

    for pattern in instance.perf_patterns() {
        let value = pattern.extraction.extract(output.text(&pattern.source)?)?;

        let outcome = match spec.references.resolve(context, &pattern.metric) {
            Resolution::Found(reference) => {
                if reference.unit != pattern.unit {
                    warn!(
                        "Unit mismatch for {}: extracted in {}, referenced in {}",
                        pattern.metric, pattern.unit, reference.unit
                    );
                }
                reference.validate(&pattern.metric, strict)?;
                MetricOutcome::Judged(evaluate(&pattern.metric, value, reference)?)
            }
            Resolution::NotFound(miss) => {
                info!(
                    "{} = {} {} recorded without judgment: {}",
                    pattern.metric, value, pattern.unit, miss
                );
                MetricOutcome::Unjudged {
                    metric: pattern.metric.clone(),
                    value,
                    unit: pattern.unit.clone(),
                    reason: miss.to_string(),
                }
            }
        };

        records.push(PerfLogRecord {
            completion_time: output.completion_time,
            tool_version: tool_version(),
            check_info: check_info.clone(),
            job_id: output.job_id.clone(),
            metric: pattern.metric.clone(),
            value,
            unit: pattern.unit.clone(),
            reference: match &outcome {
                MetricOutcome::Judged(evaluation) => Some(evaluation.reference.clone()),
                MetricOutcome::Unjudged { .. } => None,
            },
            verdict: outcome.verdict(),
        });
        outcomes.push(outcome);
    }

    let failed = outcomes
        .iter()
        .any(|o| o.verdict() == Some(Verdict::Fail));
    let status = match (failed, strict) {
        (false, _) => InstanceStatus::Passed,
        (true, true) => InstanceStatus::PerformanceFailed,
        (true, false) => InstanceStatus::PassedWithWarnings,
    };
    info!("{} {}", check_info, status);

    Ok(InstanceReport {
        check: spec.name.clone(),
        check_info,
        system: context.system().to_string(),
        partition: context.partition().to_string(),
        environ: context.environ().to_string(),
        status,
        outcomes,
        records,
    })
}

/// Judges instances concurrently and writes their perflog records
#[derive(Debug, Clone)]
pub struct Runner {
    policy: JudgePolicy,
    concurrency: usize,
    sink: Option<Arc<PerfLogSink>>,
}

impl Runner {
    pub fn new(policy: JudgePolicy, concurrency: usize, sink: Option<PerfLogSink>) -> Self {
        Self {
            policy,
            concurrency: concurrency.max(1),
            sink: sink.map(Arc::new),
        }
    }

    /// Runner configured from `[judge]` and `[perflog]`
    pub fn from_config(config: &Config) -> Self {
        let sink = config
            .perflog
            .enabled
            .then(|| PerfLogSink::new(&config.perflog));
        Self::new(JudgePolicy::from(&config.judge), config.judge.concurrency, sink)
    }

    pub fn policy(&self) -> &JudgePolicy {
        &self.policy
    }

    /// Judge one run and append its perflog records
    pub async fn run(&self, instance: &CheckInstance, output: &RunOutput) -> Result<InstanceReport> {
        let report = judge(instance, output, &self.policy)?;
        if let Some(sink) = &self.sink {
            write_records(sink, &report).await;
        }
        Ok(report)
    }

    /// Judge every run; one result per input, in input order
    pub async fn judge_batch(
        &self,
        jobs: Vec<(CheckInstance, RunOutput)>,
    ) -> Vec<Result<InstanceReport>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(jobs.len());

        for (instance, output) in jobs {
            let semaphore = Arc::clone(&semaphore);
            let runner = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PerfCheckError::InternalError {
                        message: format!("judge semaphore closed: {e}"),
                        component: Some("runner".to_string()),
                    })?;
                runner.run(&instance, &output).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PerfCheckError::InternalError {
                    message: format!("judge task failed: {e}"),
                    component: Some("runner".to_string()),
                }),
            };
            if let Err(e) = &result {
                error!("Instance aborted: {}", e);
            }
            results.push(result);
        }
        results
    }
}

async fn write_records(sink: &PerfLogSink, report: &InstanceReport) {
    if report.records.is_empty() {
        return;
    }
    if let Err(e) = sink
        .write(&report.system, &report.partition, &report.check, &report.records)
        .await
    {
        warn!("Failed to write perflog for {}: {}", report.check_info, e);
    }
}
