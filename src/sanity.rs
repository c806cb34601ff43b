//! Sanity assertions over benchmark output
//!
//! Sanity checks decide whether a run completed correctly, independent of
//! how fast it was. Any failure aborts judgment of that instance.

use crate::error::{ExtractionError, SanityError};
use crate::extraction::Extraction;
use regex::Regex;

#[derive(Debug, Clone)]
pub enum SanityCheck {
    /// The pattern occurs at least once
    Found(Regex),
    /// The pattern never occurs
    NotFound(Regex),
    /// The pattern occurs exactly `expected` times
    Count { pattern: Regex, expected: usize },
    /// Each match reports `(thread, threads, rank, ranks)` in its first four
    /// groups; there must be one match per thread of every task, and every
    /// match must agree with the task and cpus-per-task layout
    Layout {
        pattern: Regex,
        num_tasks: usize,
        num_cpus_per_task: usize,
    },
    /// The extracted value equals `expected`
    Equals { extraction: Extraction, expected: f64 },
    /// The extracted value is within a fractional band around `expected`
    Reference {
        extraction: Extraction,
        expected: f64,
        lower: Option<f64>,
        upper: Option<f64>,
    },
}

fn compile(pattern: &str) -> Result<Regex, ExtractionError> {
    Regex::new(pattern).map_err(|e| ExtractionError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

impl SanityCheck {
    pub fn found(pattern: &str) -> Result<Self, ExtractionError> {
        Ok(SanityCheck::Found(compile(pattern)?))
    }

    pub fn not_found(pattern: &str) -> Result<Self, ExtractionError> {
        Ok(SanityCheck::NotFound(compile(pattern)?))
    }

    pub fn count(pattern: &str, expected: usize) -> Result<Self, ExtractionError> {
        Ok(SanityCheck::Count {
            pattern: compile(pattern)?,
            expected,
        })
    }

    pub fn layout(
        pattern: &str,
        num_tasks: usize,
        num_cpus_per_task: usize,
    ) -> Result<Self, ExtractionError> {
        let pattern = compile(pattern)?;
        if pattern.captures_len() < 5 {
            return Err(ExtractionError::MissingGroup {
                pattern: pattern.as_str().to_string(),
                group: "4".to_string(),
            });
        }
        Ok(SanityCheck::Layout {
            pattern,
            num_tasks,
            num_cpus_per_task,
        })
    }

    pub fn equals(extraction: Extraction, expected: f64) -> Self {
        SanityCheck::Equals {
            extraction,
            expected,
        }
    }

    pub fn reference(
        extraction: Extraction,
        expected: f64,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Self {
        SanityCheck::Reference {
            extraction,
            expected,
            lower,
            upper,
        }
    }

    /// Short description for listings
    pub fn describe(&self) -> String {
        match self {
            SanityCheck::Found(re) => format!("found '{}'", re.as_str()),
            SanityCheck::NotFound(re) => format!("not found '{}'", re.as_str()),
            SanityCheck::Count { pattern, expected } => {
                format!("count '{}' == {}", pattern.as_str(), expected)
            }
            SanityCheck::Layout {
                pattern,
                num_tasks,
                num_cpus_per_task,
            } => format!(
                "'{}' laid out as {} tasks x {} threads",
                pattern.as_str(),
                num_tasks,
                num_cpus_per_task
            ),
            SanityCheck::Equals {
                extraction,
                expected,
            } => format!("'{}' == {}", extraction.pattern(), expected),
            SanityCheck::Reference {
                extraction,
                expected,
                ..
            } => format!("'{}' ~ {}", extraction.pattern(), expected),
        }
    }

    pub fn check(&self, text: &str) -> Result<(), SanityError> {
        match self {
            SanityCheck::Found(re) => {
                if re.is_match(text) {
                    Ok(())
                } else {
                    Err(SanityError::PatternNotFound {
                        pattern: re.as_str().to_string(),
                    })
                }
            }
            SanityCheck::NotFound(re) => {
                if re.is_match(text) {
                    Err(SanityError::PatternFound {
                        pattern: re.as_str().to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            SanityCheck::Count { pattern, expected } => {
                let actual = pattern.find_iter(text).count();
                if actual == *expected {
                    Ok(())
                } else {
                    Err(SanityError::CountMismatch {
                        pattern: pattern.as_str().to_string(),
                        expected: *expected,
                        actual,
                    })
                }
            }
            SanityCheck::Layout {
                pattern,
                num_tasks,
                num_cpus_per_task,
            } => check_layout(pattern, *num_tasks, *num_cpus_per_task, text),
            SanityCheck::Equals {
                extraction,
                expected,
            } => {
                let actual = extraction.extract(text)?;
                if actual == *expected {
                    Ok(())
                } else {
                    Err(SanityError::ValueMismatch {
                        expected: *expected,
                        actual,
                    })
                }
            }
            SanityCheck::Reference {
                extraction,
                expected,
                lower,
                upper,
            } => {
                let actual = extraction.extract(text)?;
                let magnitude = expected.abs();
                let lower_bound = lower.map_or(f64::NEG_INFINITY, |l| expected + l * magnitude);
                let upper_bound = upper.map_or(f64::INFINITY, |u| expected + u * magnitude);
                if actual >= lower_bound && actual <= upper_bound {
                    Ok(())
                } else {
                    Err(SanityError::OutOfBand {
                        actual,
                        lower_bound,
                        upper_bound,
                    })
                }
            }
        }
    }
}

fn check_layout(
    pattern: &Regex,
    num_tasks: usize,
    num_cpus_per_task: usize,
    text: &str,
) -> Result<(), SanityError> {
    let mut matches = 0;
    for caps in pattern.captures_iter(text) {
        matches += 1;
        let line = caps.get(0).map_or("", |m| m.as_str());
        let mut fields = [0usize; 4];
        for (i, field) in fields.iter_mut().enumerate() {
            let raw = caps.get(i + 1).map_or("", |m| m.as_str());
            *field = raw.trim().parse().map_err(|_| ExtractionError::Conversion {
                pattern: pattern.as_str().to_string(),
                text: raw.to_string(),
            })?;
        }
        let [tid, num_threads, rank, num_ranks] = fields;

        let reason = if tid >= num_threads {
            Some(format!("thread {tid} out of {num_threads}"))
        } else if rank >= num_ranks {
            Some(format!("rank {rank} out of {num_ranks}"))
        } else if num_threads != num_cpus_per_task {
            Some(format!("{num_threads} threads, expected {num_cpus_per_task}"))
        } else if num_ranks != num_tasks {
            Some(format!("{num_ranks} ranks, expected {num_tasks}"))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SanityError::LayoutMismatch {
                line: line.to_string(),
                reason,
            });
        }
    }

    let expected = num_tasks * num_cpus_per_task;
    if matches != expected {
        return Err(SanityError::CountMismatch {
            pattern: pattern.as_str().to_string(),
            expected,
            actual: matches,
        });
    }
    Ok(())
}

/// Run every check in order, stopping at the first failure
pub fn check_all(checks: &[SanityCheck], text: &str) -> Result<(), SanityError> {
    for check in checks {
        check.check(text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_and_not_found() {
        let found = SanityCheck::found(r"Solution Validates").unwrap();
        assert!(found.check("Solution Validates: avg error").is_ok());
        assert!(matches!(
            found.check("Segmentation fault"),
            Err(SanityError::PatternNotFound { .. })
        ));

        let absent = SanityCheck::not_found(r"(?i)error").unwrap();
        assert!(absent.check("all good").is_ok());
        assert!(absent.check("MPI ERROR").is_err());
    }

    #[test]
    fn test_count() {
        let text = "halo_cell_exchange a\nhalo_cell_exchange b\n";
        assert!(SanityCheck::count("halo_cell_exchange", 2).unwrap().check(text).is_ok());
        assert_eq!(
            SanityCheck::count("halo_cell_exchange", 9).unwrap().check(text),
            Err(SanityError::CountMismatch {
                pattern: "halo_cell_exchange".to_string(),
                expected: 9,
                actual: 2
            })
        );
    }

    #[test]
    fn test_layout() {
        let pattern = r"thread (\d+) of (\d+) on rank (\d+) of (\d+)";
        let check = SanityCheck::layout(pattern, 2, 2).unwrap();
        let good = "thread 0 of 2 on rank 0 of 2\nthread 1 of 2 on rank 0 of 2\n\
                    thread 0 of 2 on rank 1 of 2\nthread 1 of 2 on rank 1 of 2\n";
        assert!(check.check(good).is_ok());

        assert!(matches!(
            check.check("thread 0 of 2 on rank 0 of 2\n"),
            Err(SanityError::CountMismatch { expected: 4, actual: 1, .. })
        ));
        assert!(matches!(
            check.check(&"thread 2 of 2 on rank 0 of 2\n".repeat(4)),
            Err(SanityError::LayoutMismatch { .. })
        ));
        assert!(matches!(
            SanityCheck::layout(r"thread (\d+)", 1, 1),
            Err(ExtractionError::MissingGroup { .. })
        ));
    }

    #[test]
    fn test_equals() {
        let nprocs = Extraction::named(
            r"Received correct messages from (?P<nprocs>\d+) processes",
            "nprocs",
        )
        .unwrap();
        let check = SanityCheck::equals(nprocs, 1.0);
        assert!(check.check("Received correct messages from 1 processes").is_ok());
        assert!(matches!(
            check.check("Received correct messages from 0 processes"),
            Err(SanityError::ValueMismatch { .. })
        ));
        assert!(matches!(
            check.check("no messages"),
            Err(SanityError::Extraction(ExtractionError::NoMatch { .. }))
        ));
    }

    #[test]
    fn test_reference_band() {
        let energy = Extraction::named(r"Total Energy\s+(?P<energy>\S+)", "energy").unwrap();
        let check = SanityCheck::reference(energy, -12071400.0, Some(-0.01), Some(0.01));
        assert!(check.check("Total Energy -12080000.0").is_ok());
        assert!(matches!(
            check.check("Total Energy -13000000.0"),
            Err(SanityError::OutOfBand { .. })
        ));
    }

    #[test]
    fn test_check_all_stops_at_first_failure() {
        let checks = vec![
            SanityCheck::found("Finished").unwrap(),
            SanityCheck::found("never printed").unwrap(),
        ];
        assert!(matches!(
            check_all(&checks, "Finished"),
            Err(SanityError::PatternNotFound { pattern }) if pattern == "never printed"
        ));
        assert!(check_all(&[], "").is_ok());
    }
}
