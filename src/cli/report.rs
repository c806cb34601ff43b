//! Human-readable rendering of reports

use crate::checks::{CheckSpec, InstanceReport, InstanceStatus, MetricOutcome};
use crate::error::PerfCheckError;
use crate::metrics::SuiteSummary;
use std::fmt::Write;

fn status_banner(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::Passed => "[       OK ]",
        InstanceStatus::PassedWithWarnings => "[     WARN ]",
        InstanceStatus::PerformanceFailed => "[     FAIL ]",
    }
}

pub fn format_outcome(outcome: &MetricOutcome) -> String {
    match outcome {
        MetricOutcome::Judged(evaluation) => format!(
            "{}: {} {} (ref {}, deviation {}) {}",
            evaluation.metric,
            evaluation.measured,
            evaluation.reference.unit,
            evaluation.reference,
            evaluation.deviation_display(),
            evaluation.verdict
        ),
        MetricOutcome::Unjudged {
            metric,
            value,
            unit,
            reason,
        } => format!("{metric}: {value} {unit} (unjudged: {reason})"),
    }
}

/// One banner line plus one line per metric
pub fn format_report(report: &InstanceReport) -> String {
    let mut out = format!("{} {}", status_banner(report.status), report.check_info);
    for outcome in &report.outcomes {
        let _ = write!(out, "\n    {}", format_outcome(outcome));
    }
    out
}

/// Banner for an instance that could not be judged
pub fn format_failure(label: &str, error: &PerfCheckError) -> String {
    format!("[    ERROR ] {label}\n    {} error: {error}", error.kind())
}

/// Reference table of `spec`, one entry per line
pub fn format_references(spec: &CheckSpec) -> String {
    let mut out = spec.name.clone();
    let dimensions = spec.references.dimensions();
    if !dimensions.is_empty() {
        let names: Vec<&str> = dimensions.iter().map(|d| d.as_str()).collect();
        let _ = write!(out, " (by {})", names.join(", "));
    }
    if spec.references.is_empty() {
        out.push_str("\n    no references; metrics are recorded only");
        return out;
    }
    for (key, scope, metric, entry) in spec.references.iter() {
        let key: Vec<String> = key.iter().map(ToString::to_string).collect();
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{} ", key.join("/"))
        };
        let _ = write!(out, "\n    {prefix}{scope} {metric}: {entry}");
    }
    out
}

/// Totals line followed by the worst deviation of each judged metric
pub fn format_summary(summary: &SuiteSummary) -> String {
    let mut out = summary.to_string();
    for (metric, worst) in &summary.worst_deviations {
        let _ = write!(
            out,
            "\n    {metric}: worst {} ({}) in {}",
            worst.display, worst.verdict, worst.check_info
        );
    }
    out
}
