//! perfcheck - performance reference checking for the Cyclone regression suite
//!
//! Finished regression runs are checked for sanity, their performance
//! variables are extracted from the job output, and each value is judged
//! against the reference that applies to the run's system, partition,
//! programming environment and scale.

// Core modules
pub mod config;
pub mod error;
pub mod logging;

// Judgment pipeline
pub mod evaluation;
pub mod extraction;
pub mod perflog;
pub mod reference;
pub mod sanity;
pub mod site;

// Feature modules
pub mod checks;
pub mod cli;
pub mod metrics;

// Public API exports
pub use config::Config;
pub use error::{ConfigurationError, ExtractionError, PerfCheckError, Result, SanityError};

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use checks::{
    judge, CheckInstance, CheckRegistry, CheckSpec, InstanceReport, InstanceStatus, JudgePolicy,
    MetricOutcome, RunOutput, Runner,
};
pub use evaluation::{evaluate, Evaluation, Verdict};
pub use extraction::{Aggregate, Extraction};
pub use metrics::SuiteSummary;
pub use perflog::{PerfLogRecord, PerfLogSink};
pub use reference::{
    Dimension, ReferenceEntry, ReferenceTable, Resolution, SelectorContext, SelectorValue,
    ToleranceMode,
};
pub use sanity::SanityCheck;
pub use site::SiteConfig;
