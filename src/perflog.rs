//! Performance log records and the per-check perflog files
//!
//! Every judged or unjudged metric produces one line:
//!
//! ```text
//! <timestamp>|perfcheck <version>|<check info>|jobid=<id>|<metric>=<value>|ref=<expected> (l=<lower>, u=<upper>)|<unit>
//! ```

use crate::config::PerfLogConfig;
use crate::error::{PerfCheckError, Result};
use crate::evaluation::Verdict;
use crate::reference::entry::Tolerance;
use crate::reference::ReferenceEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tool version stamped on every record
pub fn tool_version() -> String {
    format!("perfcheck {}", env!("CARGO_PKG_VERSION"))
}

/// One perflog line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfLogRecord {
    pub completion_time: DateTime<Utc>,
    pub tool_version: String,
    pub check_info: String,
    pub job_id: Option<String>,
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub reference: Option<ReferenceEntry>,
    /// `None` when the metric was recorded without judgment
    pub verdict: Option<Verdict>,
}

impl PerfLogRecord {
    /// Emit the record as a structured tracing event
    pub fn trace(&self) {
        info!(
            target: "perfcheck::perflog",
            check = %self.check_info,
            metric = %self.metric,
            value = self.value,
            unit = %self.unit,
            verdict = %self.verdict.map(|v| v.to_string()).unwrap_or_else(|| "unjudged".to_string()),
            "{}",
            self
        );
    }
}

impl fmt::Display for PerfLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|jobid={}|{}={}|",
            self.completion_time.format("%Y-%m-%dT%H:%M:%S%:z"),
            self.tool_version,
            self.check_info,
            self.job_id.as_deref().unwrap_or("None"),
            self.metric,
            self.value,
        )?;
        match &self.reference {
            Some(reference) => write!(
                f,
                "ref={} (l={}, u={})|",
                reference.expected,
                Tolerance(reference.lower),
                Tolerance(reference.upper)
            )?,
            None => f.write_str("ref=None (l=None, u=None)|")?,
        }
        f.write_str(&self.unit)
    }
}

/// Appends perflog records to `<directory>/<system>/<partition>/<check>.log`
#[derive(Debug)]
pub struct PerfLogSink {
    directory: PathBuf,
    append: bool,
    // Files already opened by this sink; with `append = false` only the
    // first write truncates.
    opened: Mutex<HashSet<PathBuf>>,
}

impl PerfLogSink {
    pub fn new(config: &PerfLogConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            append: config.append,
            opened: Mutex::new(HashSet::new()),
        }
    }

    /// Path of the perflog file for one check on one partition
    pub fn path_for(&self, system: &str, partition: &str, check: &str) -> PathBuf {
        self.directory
            .join(sanitize(system))
            .join(sanitize(partition))
            .join(format!("{}.log", sanitize(check)))
    }

    /// Write `records` and return the file they went to
    pub async fn write(
        &self,
        system: &str,
        partition: &str,
        check: &str,
        records: &[PerfLogRecord],
    ) -> Result<PathBuf> {
        let path = self.path_for(system, partition, check);

        // Held for the whole write so concurrent instances do not interleave lines
        let mut opened = self.opened.lock().await;
        let truncate = !self.append && !opened.contains(&path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let mut file = options.open(&path).await.map_err(|e| io_error(&path, e))?;

        let mut buffer = String::new();
        for record in records {
            record.trace();
            buffer.push_str(&record.to_string());
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;

        opened.insert(path.clone());
        debug!("Wrote {} perflog records to {}", records.len(), path.display());
        Ok(path)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PerfCheckError {
    PerfCheckError::IoError {
        message: format!("perflog {}: {}", path.display(), e),
        source: Some(e),
    }
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect()
}
