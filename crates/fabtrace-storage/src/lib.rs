//! Persistence boundary for run artifacts.
//!
//! A [`RunStore`] is rooted at a directory. Each run gets its own
//! subdirectory keyed by run id, holding:
//!
//! - `path_definitions.json`: the distinct [`PathDefinition`]s, creation
//!   order preserved
//! - `attempts.json`: one row per sampling attempt
//! - `review_flags.json`: pairs the oracle could not connect
//! - `summary.json`: the aggregated [`RunSummary`]
//!
//! Definitions are content-addressed and never rewritten; summaries are
//! written once at run end. Artifacts outlive the run that produced them.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fabtrace_core::{RunReport, RunStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("run {0} has no persisted summary")]
    MissingRun(Uuid),
}

/// Aggregated per-run row, mirrored from the run report at persist time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub fab: String,
    pub tag: String,
    pub status: RunStatus,
    pub reason: String,
    pub total_attempts: u32,
    pub paths_found: u32,
    pub unique_paths: u32,
    pub review_flags: u32,
    pub target_coverage: f64,
    pub achieved_coverage: f64,
    /// Achieved coverage as a share of the target, in percent.
    pub coverage_efficiency: Option<f64>,
    /// Found paths as a share of oracle attempts, in percent.
    pub success_rate: f64,
    pub total_nodes: u64,
    pub total_links: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub summarized_at: DateTime<Utc>,
}

impl RunSummary {
    fn from_report(report: &RunReport, target_coverage: f64) -> Self {
        let success_rate = if report.paths_attempted > 0 {
            f64::from(report.paths_found) / f64::from(report.paths_attempted) * 100.0
        } else {
            0.0
        };
        let coverage_efficiency = if target_coverage > 0.0 {
            Some(report.coverage.percentage / target_coverage * 100.0)
        } else {
            None
        };

        Self {
            run_id: report.run_id,
            fab: report.fab.clone(),
            tag: report.tag.clone(),
            status: report.status,
            reason: report.reason.clone(),
            total_attempts: report.attempts.len() as u32,
            paths_found: report.paths_found,
            unique_paths: report.unique_paths(),
            review_flags: report.review_flags.len() as u32,
            target_coverage,
            achieved_coverage: report.coverage.percentage,
            coverage_efficiency,
            success_rate,
            total_nodes: report.coverage.total_nodes,
            total_links: report.coverage.total_links,
            started_at: report.started_at,
            ended_at: report.ended_at,
            duration_secs: report.duration_secs(),
            summarized_at: Utc::now(),
        }
    }
}

/// Directory-rooted artifact store.
pub struct RunStore {
    root: PathBuf,
    /// Serializes whole-run writes; a run directory is written exactly once.
    write_lock: Mutex<()>,
}

impl RunStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Persist every artifact of a finished run and return its summary row.
    pub fn persist_run(
        &self,
        report: &RunReport,
        target_coverage: f64,
    ) -> Result<RunSummary, StoreError> {
        let _guard = self.write_lock.lock();

        let dir = self.run_dir(report.run_id);
        fs::create_dir_all(&dir)?;

        let definitions: Vec<_> = report.paths.iter().map(|p| p.as_ref().clone()).collect();
        write_json(&dir.join("path_definitions.json"), &definitions)?;
        write_json(&dir.join("attempts.json"), &report.attempts)?;
        write_json(&dir.join("review_flags.json"), &report.review_flags)?;

        let summary = RunSummary::from_report(report, target_coverage);
        write_json(&dir.join("summary.json"), &summary)?;

        tracing::info!(
            run_id = %report.run_id,
            dir = %dir.display(),
            paths = definitions.len(),
            "run artifacts persisted"
        );
        Ok(summary)
    }

    pub fn load_summary(&self, run_id: Uuid) -> Result<RunSummary, StoreError> {
        let path = self.run_dir(run_id).join("summary.json");
        if !path.exists() {
            return Err(StoreError::MissingRun(run_id));
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn load_definitions(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<fabtrace_core::PathDefinition>, StoreError> {
        let path = self.run_dir(run_id).join("path_definitions.json");
        if !path.exists() {
            return Err(StoreError::MissingRun(run_id));
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Run ids with a persisted summary, in directory order.
    pub fn list_runs(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Ok(run_id) = name.parse::<Uuid>() {
                if entry.path().join("summary.json").exists() {
                    runs.push(run_id);
                }
            }
        }
        Ok(runs)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw)?;
    Ok(())
}
