//! Tolerance evaluation of a measured value against its reference

use crate::error::ConfigurationError;
use crate::reference::{ReferenceEntry, ToleranceMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Pass/fail outcome of one judged metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("pass"),
            Verdict::Fail => f.write_str("fail"),
        }
    }
}

/// A measured value judged against a reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub metric: String,
    pub measured: f64,
    pub reference: ReferenceEntry,
    /// Fraction of the expected value, or a difference in the metric's
    /// unit for absolute references
    pub deviation: f64,
    pub verdict: Verdict,
}

impl Evaluation {
    /// Deviation formatted for humans: a percentage or a signed difference
    pub fn deviation_display(&self) -> String {
        match self.reference.mode {
            ToleranceMode::Fractional => format!("{:+.2}%", self.deviation * 100.0),
            ToleranceMode::Absolute => format!("{:+} {}", self.deviation, self.reference.unit),
        }
    }
}

/// Compute the deviation of `measured` from `reference`.
///
/// Fractional deviations are relative to the magnitude of the expected
/// value so that a negative reference is judged with the same orientation
/// as a positive one.
pub fn deviation(
    metric: &str,
    measured: f64,
    reference: &ReferenceEntry,
) -> Result<f64, ConfigurationError> {
    if !measured.is_finite() {
        return Err(ConfigurationError::NonFinite {
            metric: metric.to_string(),
            what: "measured value",
            value: measured,
        });
    }
    if !reference.expected.is_finite() {
        return Err(ConfigurationError::NonFinite {
            metric: metric.to_string(),
            what: "expected value",
            value: reference.expected,
        });
    }

    match reference.mode {
        ToleranceMode::Fractional => {
            if reference.expected == 0.0 {
                return Err(ConfigurationError::ZeroExpected {
                    metric: metric.to_string(),
                });
            }
            Ok((measured - reference.expected) / reference.expected.abs())
        }
        ToleranceMode::Absolute => Ok(measured - reference.expected),
    }
}

/// Judge `measured` against `reference`.
///
/// The deviation is logged whatever the verdict. A malformed reference is
/// a [`ConfigurationError`]; an out-of-band value is a normal
/// [`Verdict::Fail`].
pub fn evaluate(
    metric: &str,
    measured: f64,
    reference: &ReferenceEntry,
) -> Result<Evaluation, ConfigurationError> {
    let d = deviation(metric, measured, reference)?;

    let below = reference.lower.is_some_and(|lower| d < lower);
    let above = reference.upper.is_some_and(|upper| d > upper);
    let verdict = if below || above {
        Verdict::Fail
    } else {
        Verdict::Pass
    };

    info!(
        metric = metric,
        measured = measured,
        expected = reference.expected,
        deviation = d,
        verdict = %verdict,
        "Evaluated performance metric"
    );
    if below {
        debug!("{} is below its lower tolerance", metric);
    } else if above {
        debug!("{} is above its upper tolerance", metric);
    }

    Ok(Evaluation {
        metric: metric.to_string(),
        measured,
        reference: reference.clone(),
        deviation: d,
        verdict,
    })
}
