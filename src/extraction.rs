//! Metric extraction from benchmark output
//!
//! An [`Extraction`] pairs a compiled regex with the capture group that
//! holds the number, a [`Selection`] policy for repeated matches, and an
//! optional default used when the pattern never matches.

use crate::error::ExtractionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture group holding the numeric value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Index(usize),
    Name(String),
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Index(i) => write!(f, "{i}"),
            Group::Name(name) => f.write_str(name),
        }
    }
}

/// Reduction applied to every match of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Mean,
    Min,
    Max,
    Sum,
}

impl Aggregate {
    fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Aggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregate::Sum => values.iter().sum(),
        }
    }
}

/// Which match (or reduction of matches) becomes the metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based occurrence; negative counts from the end (`-1` = last)
    Occurrence(isize),
    Aggregate(Aggregate),
}

/// A named numeric pattern over program output
#[derive(Debug, Clone)]
pub struct Extraction {
    regex: Regex,
    group: Group,
    selection: Selection,
    default: Option<f64>,
    scale: f64,
}

impl Extraction {
    /// Compile `pattern`, taking the first occurrence of `group`
    pub fn new(pattern: &str, group: Group) -> Result<Self, ExtractionError> {
        let regex = Regex::new(pattern).map_err(|e| ExtractionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        if let Group::Name(name) = &group {
            if !regex.capture_names().flatten().any(|n| n == name) {
                return Err(ExtractionError::MissingGroup {
                    pattern: pattern.to_string(),
                    group: name.clone(),
                });
            }
        }
        if let Group::Index(index) = group {
            if index >= regex.captures_len() {
                return Err(ExtractionError::MissingGroup {
                    pattern: pattern.to_string(),
                    group: index.to_string(),
                });
            }
        }

        Ok(Self {
            regex,
            group,
            selection: Selection::Occurrence(0),
            default: None,
            scale: 1.0,
        })
    }

    /// Shorthand for a named capture group
    pub fn named(pattern: &str, name: &str) -> Result<Self, ExtractionError> {
        Self::new(pattern, Group::Name(name.to_string()))
    }

    /// Shorthand for a numbered capture group
    pub fn indexed(pattern: &str, index: usize) -> Result<Self, ExtractionError> {
        Self::new(pattern, Group::Index(index))
    }

    pub fn occurrence(mut self, index: isize) -> Self {
        self.selection = Selection::Occurrence(index);
        self
    }

    pub fn last(self) -> Self {
        self.occurrence(-1)
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.selection = Selection::Aggregate(aggregate);
        self
    }

    /// Value used when the pattern matches nothing, in the output's own unit
    /// (it is scaled like a matched value)
    pub fn default_value(mut self, value: f64) -> Self {
        self.default = Some(value);
        self
    }

    /// Multiply every extracted value, e.g. `1e-9` to turn ns into s
    pub fn scaled(mut self, factor: f64) -> Self {
        self.scale = factor;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Every matched value, in output order.
    ///
    /// Zero matches is an error unless a default is declared, in which case
    /// the default is the only value.
    pub fn extract_all(&self, text: &str) -> Result<Vec<f64>, ExtractionError> {
        let mut values = Vec::new();
        for caps in self.regex.captures_iter(text) {
            let matched = match &self.group {
                Group::Index(i) => caps.get(*i),
                Group::Name(name) => caps.name(name),
            };
            let raw = matched.ok_or_else(|| ExtractionError::MissingGroup {
                pattern: self.pattern().to_string(),
                group: self.group.to_string(),
            })?;
            let value: f64 =
                raw.as_str()
                    .trim()
                    .parse()
                    .map_err(|_| ExtractionError::Conversion {
                        pattern: self.pattern().to_string(),
                        text: raw.as_str().to_string(),
                    })?;
            values.push(value * self.scale);
        }

        if values.is_empty() {
            return match self.default {
                Some(default) => Ok(vec![default * self.scale]),
                None => Err(ExtractionError::NoMatch {
                    pattern: self.pattern().to_string(),
                }),
            };
        }
        Ok(values)
    }

    /// The single value selected from `text`
    pub fn extract(&self, text: &str) -> Result<f64, ExtractionError> {
        let values = self.extract_all(text)?;
        match self.selection {
            Selection::Aggregate(aggregate) => Ok(aggregate.apply(&values)),
            Selection::Occurrence(index) => {
                let resolved = if index < 0 {
                    values.len().checked_sub(index.unsigned_abs())
                } else {
                    Some(index as usize)
                };
                resolved
                    .and_then(|i| values.get(i).copied())
                    .ok_or_else(|| ExtractionError::OccurrenceOutOfRange {
                        pattern: self.pattern().to_string(),
                        matches: values.len(),
                        index,
                    })
            }
        }
    }

    /// Number of non-overlapping matches in `text`
    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM_OUTPUT: &str = "\
Function    Best Rate MB/s  Avg time     Min time     Max time
Copy:           90412.3     0.017174     0.017153     0.017192
Scale:          77110.0     0.020001     0.019980     0.020100
Add:            77650.1     0.030911     0.030900     0.031000
Triad:          79301.7     0.030274     0.030261     0.030290
Solution Validates: avg error less than 1.000000e-13 on all three arrays
";

    #[test]
    fn test_extract_named_first() {
        let triad = Extraction::named(r"Triad:\s+(?P<triad>\S+)\s+\S+", "triad").unwrap();
        assert_eq!(triad.extract(STREAM_OUTPUT).unwrap(), 79301.7);
    }

    #[test]
    fn test_extract_indexed_last() {
        let text = "Node Triad: 1.0:\nNode Triad: 2.0:\nNode Triad: 3.5:\n";
        let triad = Extraction::indexed(r"Node Triad:\s+(\S+):", 1).unwrap().last();
        assert_eq!(triad.extract(text).unwrap(), 3.5);

        let first = Extraction::indexed(r"Node Triad:\s+(\S+):", 1).unwrap();
        assert_eq!(first.extract(text).unwrap(), 1.0);
    }

    #[test]
    fn test_extract_mean() {
        let text = "Epoch 0: 300.0 images/sec\nEpoch 1: 310.0 images/sec\nEpoch 2: 320.0 images/sec\n";
        let per_gpu = Extraction::named(r"Epoch\s+\d+:\s+(?P<v>\S+)\s+images", "v")
            .unwrap()
            .aggregate(Aggregate::Mean);
        assert_eq!(per_gpu.extract(text).unwrap(), 310.0);
        assert_eq!(per_gpu.extract_all(text).unwrap().len(), 3);
    }

    #[test]
    fn test_other_aggregates() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(Aggregate::Min.apply(&values), 1.0);
        assert_eq!(Aggregate::Max.apply(&values), 3.0);
        assert_eq!(Aggregate::Sum.apply(&values), 6.0);
    }

    #[test]
    fn test_no_match_is_error() {
        let perf = Extraction::named(r"Performance:\s+(?P<perf>\S+)", "perf").unwrap();
        assert_eq!(
            perf.extract("mdrun crashed"),
            Err(ExtractionError::NoMatch {
                pattern: r"Performance:\s+(?P<perf>\S+)".to_string()
            })
        );
    }

    #[test]
    fn test_no_match_uses_default() {
        let perf = Extraction::named(r"Performance:\s+(?P<perf>\S+)", "perf")
            .unwrap()
            .default_value(0.0);
        assert_eq!(perf.extract("mdrun crashed").unwrap(), 0.0);
    }

    #[test]
    fn test_conversion_error() {
        let perf = Extraction::named(r"Performance:\s+(?P<perf>\S+)", "perf").unwrap();
        assert!(matches!(
            perf.extract("Performance: fast"),
            Err(ExtractionError::Conversion { .. })
        ));
    }

    #[test]
    fn test_occurrence_out_of_range() {
        let text = "rate = 1.5\n";
        let rate = Extraction::indexed(r"rate = (\S+)", 1).unwrap().occurrence(3);
        assert!(matches!(
            rate.extract(text),
            Err(ExtractionError::OccurrenceOutOfRange { matches: 1, .. })
        ));
        let rate = Extraction::indexed(r"rate = (\S+)", 1).unwrap().occurrence(-2);
        assert!(rate.extract(text).is_err());
    }

    #[test]
    fn test_scaled() {
        let build = "Compilations time (ns): 1500000000\n";
        let time = Extraction::indexed(r"Compilations time \(ns\): (\d+)", 1)
            .unwrap()
            .scaled(1.0e-9);
        assert!((time.extract(build).unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_default_is_scaled_like_a_match() {
        let time = Extraction::indexed(r"Compilations time \(ns\): (\d+)", 1)
            .unwrap()
            .scaled(1.0e-9)
            .default_value(2.0e9);
        let matched = time.extract("Compilations time (ns): 2000000000\n").unwrap();
        let missing = time.extract("nothing").unwrap();
        assert!((matched - 2.0).abs() < 1e-12);
        assert!((missing - matched).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_pattern_and_group() {
        assert!(matches!(
            Extraction::indexed(r"(unclosed", 1),
            Err(ExtractionError::InvalidPattern { .. })
        ));
        assert!(matches!(
            Extraction::named(r"(?P<a>\d+)", "b"),
            Err(ExtractionError::MissingGroup { .. })
        ));
        assert!(matches!(
            Extraction::indexed(r"(\d+)", 2),
            Err(ExtractionError::MissingGroup { .. })
        ));
    }

    #[test]
    fn test_count() {
        let text = "halo_cell_exchange 6 2\nhalo_cell_exchange 6 3\nother\n";
        let halo = Extraction::indexed(r"halo_cell_exchange", 0).unwrap();
        assert_eq!(halo.count(text), 2);
    }
}
