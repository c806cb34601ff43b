//! Command line interface for perfcheck
//!
//! Lists the built-in checks and their references, and judges finished
//! runs one at a time or from a batch manifest.

pub mod app;
pub mod commands;
pub mod manifest;
pub mod report;

pub use app::App;
pub use commands::{Cli, Commands, JudgeArgs};
pub use manifest::{BatchManifest, RunEntry};
