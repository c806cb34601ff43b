//! Batch manifests: many finished runs described in one TOML file
//!
//! ```toml
//! [[runs]]
//! check = "BenchioSmallTest"
//! system = "cyclone:cpu"
//! environ = "PrgEnv-gnu-nocuda"
//! params = { num_nodes = 1, benchmark = "nvme" }
//! stdout = "benchio/1/rfm_job.out"
//! job_id = "123456"
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use crate::checks::{CheckInstance, CheckRegistry, RunOutput};
use crate::error::{PerfCheckError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchManifest {
    #[serde(default)]
    pub runs: Vec<RunEntry>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunEntry {
    pub check: String,
    pub system: String,
    pub environ: String,
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub build_stdout: Option<PathBuf>,
    #[serde(default)]
    pub files: BTreeMap<String, PathBuf>,
    pub job_id: Option<String>,
    pub completion_time: Option<DateTime<Utc>>,
}

impl BatchManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PerfCheckError::IoError {
            message: format!("Failed to read manifest {}: {}", path.display(), e),
            source: Some(e),
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&content, base_dir)
    }

    pub fn from_toml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut manifest: BatchManifest = toml::from_str(content)?;
        manifest.base_dir = base_dir.into();
        debug!("Manifest lists {} runs", manifest.runs.len());
        Ok(manifest)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl RunEntry {
    /// Parameter bindings as strings, the way they are given on the command line
    pub fn param_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Bind the named check to this run
    pub fn instance(&self, registry: &CheckRegistry) -> Result<CheckInstance> {
        let spec = registry.get(&self.check)?;
        CheckInstance::from_pairs(spec, &self.system, &self.environ, &self.param_pairs())
    }

    /// Read the run's output files
    pub async fn load_output(&self, base_dir: &Path) -> Result<RunOutput> {
        let mut output = RunOutput::new(read_optional(base_dir, self.stdout.as_deref()).await?);
        if let Some(stderr) = &self.stderr {
            output = output.with_stderr(read_text(&base_dir.join(stderr)).await?);
        }
        if let Some(build_stdout) = &self.build_stdout {
            output = output.with_build_stdout(read_text(&base_dir.join(build_stdout)).await?);
        }
        for (name, path) in &self.files {
            output = output.with_file(name, read_text(&base_dir.join(path)).await?);
        }
        if let Some(job_id) = &self.job_id {
            output = output.with_job_id(job_id.clone());
        }
        if let Some(completion_time) = self.completion_time {
            output = output.with_completion_time(completion_time);
        }
        Ok(output)
    }
}

async fn read_optional(base_dir: &Path, path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => read_text(&base_dir.join(path)).await,
        None => Ok(String::new()),
    }
}

/// Read an output file, naming it in the error
pub async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PerfCheckError::IoError {
            message: format!("Failed to read {}: {}", path.display(), e),
            source: Some(e),
        })
}
