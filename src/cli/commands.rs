//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// perfcheck command line
#[derive(Parser, Debug)]
#[command(name = "perfcheck")]
#[command(about = "Judge Cyclone regression runs against their performance references")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: $PERFCHECK_CONFIG_PATH or ./perfcheck.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Site configuration file, overriding `[site] path`
    #[arg(long, global = true)]
    pub site: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered checks
    List {
        /// Only checks carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// List the instances a check expands into on the site
    Instances { check: String },
    /// Print a check's reference table
    References { check: String },
    /// Judge one finished run
    Judge(JudgeArgs),
    /// Judge every run listed in a TOML manifest
    Batch { manifest: PathBuf },
    /// Validate the site configuration and every reference table
    Validate,
    /// Write a sample configuration file
    InitConfig {
        #[arg(default_value = "perfcheck.toml")]
        path: PathBuf,
    },
}

/// Arguments of `perfcheck judge`
#[derive(Args, Debug, Clone)]
pub struct JudgeArgs {
    /// Check name
    pub check: String,

    /// Partition the run used, as `system:partition`
    #[arg(long)]
    pub system: String,

    /// Programming environment the run used
    #[arg(long)]
    pub environ: String,

    /// Parameter binding, as `name=value`; repeat for each parameter
    #[arg(short, long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// File holding the job's standard output
    #[arg(long)]
    pub stdout: Option<PathBuf>,

    /// File holding the job's standard error
    #[arg(long)]
    pub stderr: Option<PathBuf>,

    /// File holding the build's standard output
    #[arg(long)]
    pub build_stdout: Option<PathBuf>,

    /// Named output file, as `name=path`
    #[arg(long = "file", value_parser = parse_key_value)]
    pub files: Vec<(String, String)>,

    /// Scheduler job id, recorded in the perflog
    #[arg(long)]
    pub job_id: Option<String>,
}

/// Parse `key=value`
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}
