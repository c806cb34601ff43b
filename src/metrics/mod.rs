//! Suite-level metrics over judged instances

pub mod summary;

pub use summary::{SuiteSummary, WorstDeviation};
