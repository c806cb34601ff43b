//! Reference entries: an expected value plus its acceptance band

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the tolerances of a [`ReferenceEntry`] are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceMode {
    /// Tolerances are fractions of the expected value (`-0.05` = 5% below)
    #[default]
    Fractional,
    /// Tolerances are differences in the metric's own unit
    Absolute,
}

/// Expected performance value with asymmetric, optionally unbounded tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub expected: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub unit: String,
    #[serde(default)]
    pub mode: ToleranceMode,
}

impl ReferenceEntry {
    /// Create a reference with fractional tolerances
    pub fn new(expected: f64, lower: Option<f64>, upper: Option<f64>, unit: &str) -> Self {
        Self {
            expected,
            lower,
            upper,
            unit: unit.to_string(),
            mode: ToleranceMode::Fractional,
        }
    }

    /// Create a reference whose tolerances are absolute differences
    pub fn absolute(expected: f64, lower: Option<f64>, upper: Option<f64>, unit: &str) -> Self {
        Self {
            mode: ToleranceMode::Absolute,
            ..Self::new(expected, lower, upper, unit)
        }
    }

    /// True when neither side is bounded; such metrics are only recorded
    pub fn is_informational(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Lowest acceptable measured value, if bounded below
    pub fn lower_bound(&self) -> Option<f64> {
        self.lower.map(|tol| self.bound(tol))
    }

    /// Highest acceptable measured value, if bounded above
    pub fn upper_bound(&self) -> Option<f64> {
        self.upper.map(|tol| self.bound(tol))
    }

    fn bound(&self, tolerance: f64) -> f64 {
        match self.mode {
            // Scaling by the magnitude keeps "lower" below "upper" for negative references
            ToleranceMode::Fractional => self.expected + tolerance * self.expected.abs(),
            ToleranceMode::Absolute => self.expected + tolerance,
        }
    }

    /// Check that this entry can be judged against.
    ///
    /// `strict` additionally rejects entries without any tolerance.
    pub fn validate(&self, metric: &str, strict: bool) -> Result<(), ConfigurationError> {
        if !self.expected.is_finite() {
            return Err(ConfigurationError::NonFinite {
                metric: metric.to_string(),
                what: "expected value",
                value: self.expected,
            });
        }

        if self.mode == ToleranceMode::Fractional && self.expected == 0.0 {
            return Err(ConfigurationError::ZeroExpected {
                metric: metric.to_string(),
            });
        }

        if let Some(lower) = self.lower {
            if !lower.is_finite() {
                return Err(ConfigurationError::NonFinite {
                    metric: metric.to_string(),
                    what: "lower tolerance",
                    value: lower,
                });
            }
            if lower > 0.0 {
                return Err(ConfigurationError::PositiveLower {
                    metric: metric.to_string(),
                    value: lower,
                });
            }
        }

        if let Some(upper) = self.upper {
            if !upper.is_finite() {
                return Err(ConfigurationError::NonFinite {
                    metric: metric.to_string(),
                    what: "upper tolerance",
                    value: upper,
                });
            }
            if upper < 0.0 {
                return Err(ConfigurationError::NegativeUpper {
                    metric: metric.to_string(),
                    value: upper,
                });
            }
        }

        if strict && self.is_informational() {
            return Err(ConfigurationError::Unbounded {
                metric: metric.to_string(),
            });
        }

        Ok(())
    }
}

/// Formats an optional tolerance the way the perflog prints it
pub(crate) struct Tolerance(pub Option<f64>);

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value}"),
            None => f.write_str("None"),
        }
    }
}

impl fmt::Display for ReferenceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (l={}, u={}) {}",
            self.expected,
            Tolerance(self.lower),
            Tolerance(self.upper),
            self.unit
        )?;
        if self.mode == ToleranceMode::Absolute {
            f.write_str(" [absolute]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_bounds() {
        let entry = ReferenceEntry::new(100.0, Some(-0.05), Some(0.10), "MB/s");
        assert!((entry.lower_bound().unwrap() - 95.0).abs() < 1e-9);
        assert!((entry.upper_bound().unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_reference_bounds_stay_ordered() {
        // GROMACS total energy is negative
        let entry = ReferenceEntry::new(-12071400.0, Some(-0.01), Some(0.01), "");
        let lower = entry.lower_bound().unwrap();
        let upper = entry.upper_bound().unwrap();
        assert!(lower < entry.expected);
        assert!(upper > entry.expected);
    }

    #[test]
    fn test_absolute_bounds() {
        let entry = ReferenceEntry::absolute(60.0, None, Some(6.0), "s");
        assert!(entry.lower_bound().is_none());
        assert_eq!(entry.upper_bound(), Some(66.0));
    }

    #[test]
    fn test_validate_rejects_zero_expected_fractional() {
        let entry = ReferenceEntry::new(0.0, Some(-0.1), None, "s");
        assert_eq!(
            entry.validate("time", false),
            Err(ConfigurationError::ZeroExpected {
                metric: "time".to_string()
            })
        );

        // Absolute tolerances around zero are meaningful
        let entry = ReferenceEntry::absolute(0.0, Some(-0.1), Some(0.1), "s");
        assert!(entry.validate("time", false).is_ok());
    }

    #[test]
    fn test_validate_tolerance_signs() {
        let entry = ReferenceEntry::new(1.0, Some(0.1), None, "s");
        assert!(matches!(
            entry.validate("t", false),
            Err(ConfigurationError::PositiveLower { .. })
        ));

        let entry = ReferenceEntry::new(1.0, None, Some(-0.1), "s");
        assert!(matches!(
            entry.validate("t", false),
            Err(ConfigurationError::NegativeUpper { .. })
        ));
    }

    #[test]
    fn test_validate_strict_requires_a_tolerance() {
        let entry = ReferenceEntry::new(5.0, None, None, "ns/day");
        assert!(entry.validate("perf", false).is_ok());
        assert!(matches!(
            entry.validate("perf", true),
            Err(ConfigurationError::Unbounded { .. })
        ));
    }

    #[test]
    fn test_display() {
        let entry = ReferenceEntry::new(0.98, None, Some(0.1), "us");
        assert_eq!(entry.to_string(), "0.98 (l=None, u=0.1) us");
    }
}
