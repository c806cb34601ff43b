//! Regression check definitions, the built-in catalog and the judgment pipeline

pub mod catalog;
pub mod registry;
pub mod runner;
pub mod spec;

pub use registry::CheckRegistry;
pub use runner::{
    judge, InstanceReport, InstanceStatus, JudgePolicy, MetricOutcome, RunOutput, Runner,
};
pub use spec::{
    CheckInstance, CheckSpec, CheckSpecBuilder, Condition, OutputSource, Parameter, PerfPattern,
    SanityRule,
};
