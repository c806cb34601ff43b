//! Tallies over a judged suite

use crate::checks::{InstanceReport, InstanceStatus, MetricOutcome};
use crate::error::{PerfCheckError, Result};
use crate::evaluation::Verdict;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Largest deviation seen for one metric of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorstDeviation {
    pub check_info: String,
    pub deviation: f64,
    pub display: String,
    pub verdict: Verdict,
}

/// Counts of instance statuses and metric outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteSummary {
    pub passed: u64,
    pub passed_with_warnings: u64,
    pub performance_failed: u64,
    /// Aborted instances by error kind
    pub errored: BTreeMap<String, u64>,
    pub metrics_passed: u64,
    pub metrics_failed: u64,
    pub metrics_unjudged: u64,
    /// Keyed by `check/metric`
    pub worst_deviations: BTreeMap<String, WorstDeviation>,
}

impl SuiteSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarize a batch of results
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a Result<InstanceReport>>) -> Self {
        let mut summary = Self::new();
        for result in results {
            summary.record(result);
        }
        summary
    }

    pub fn record(&mut self, result: &Result<InstanceReport>) {
        match result {
            Ok(report) => self.record_report(report),
            Err(e) => self.record_error(e),
        }
    }

    pub fn record_report(&mut self, report: &InstanceReport) {
        match report.status {
            InstanceStatus::Passed => self.passed += 1,
            InstanceStatus::PassedWithWarnings => self.passed_with_warnings += 1,
            InstanceStatus::PerformanceFailed => self.performance_failed += 1,
        }

        for outcome in &report.outcomes {
            match outcome {
                MetricOutcome::Judged(evaluation) => {
                    match evaluation.verdict {
                        Verdict::Pass => self.metrics_passed += 1,
                        Verdict::Fail => self.metrics_failed += 1,
                    }

                    let key = format!("{}/{}", report.check, evaluation.metric);
                    let worse = self
                        .worst_deviations
                        .get(&key)
                        .map_or(true, |w| evaluation.deviation.abs() > w.deviation.abs());
                    if worse {
                        self.worst_deviations.insert(
                            key,
                            WorstDeviation {
                                check_info: report.check_info.clone(),
                                deviation: evaluation.deviation,
                                display: evaluation.deviation_display(),
                                verdict: evaluation.verdict,
                            },
                        );
                    }
                }
                MetricOutcome::Unjudged { .. } => self.metrics_unjudged += 1,
            }
        }
    }

    pub fn record_error(&mut self, error: &PerfCheckError) {
        *self.errored.entry(error.kind().to_string()).or_insert(0) += 1;
    }

    pub fn total_errored(&self) -> u64 {
        self.errored.values().sum()
    }

    pub fn total_instances(&self) -> u64 {
        self.passed + self.passed_with_warnings + self.performance_failed + self.total_errored()
    }

    /// No instance failed or errored
    pub fn is_success(&self) -> bool {
        self.performance_failed == 0 && self.total_errored() == 0
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} instances: {} passed, {} passed with warnings, {} failed, {} errored; \
             metrics: {} pass, {} fail, {} unjudged",
            self.total_instances(),
            self.passed,
            self.passed_with_warnings,
            self.performance_failed,
            self.total_errored(),
            self.metrics_passed,
            self.metrics_failed,
            self.metrics_unjudged
        )
    }
}
