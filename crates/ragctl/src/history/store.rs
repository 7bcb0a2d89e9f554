//! History store trait
//!
//! [`HistoryStore`] is the durable system of record for pipeline runs. Backends
//! implement the primitive operations; run creation and the read-side queries
//! used by retry are provided on top of them.

use chrono::Utc;

use super::run_id::allocate_run_id;
use crate::error::Result;
use crate::pipeline::OperatingMode;
use crate::types::{FileResult, PipelineRun, RunConfig, RunSummary};

/// Storage contract for pipeline run history.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn HistoryStore>`.
pub trait HistoryStore: Send + Sync {
    /// Human-readable storage location
    fn location(&self) -> String;

    /// Atomically reserve `run_id` (insert-if-absent).
    ///
    /// Returns `false` when the id is already claimed or persisted.
    fn claim_run_id(&self, run_id: &str) -> Result<bool>;

    /// Persist the full run under its `run_id`, replacing any previous record.
    ///
    /// The write is atomic: a reader sees either the old record or the new one.
    fn save_run(&self, run: &PipelineRun) -> Result<()>;

    /// Exact lookup. Returns `Ok(None)` when no record exists.
    fn get_run(&self, run_id: &str) -> Result<Option<PipelineRun>>;

    /// All readable runs, oldest first by timestamp (ties broken by id).
    ///
    /// Records that cannot be decoded are skipped with a warning.
    fn list_runs(&self) -> Result<Vec<PipelineRun>>;

    /// Allocate a fresh id and build an unsaved run in `Initializing` state
    fn create_run(
        &self,
        total_files: usize,
        mode: OperatingMode,
        config: RunConfig,
    ) -> Result<PipelineRun> {
        let run_id = allocate_run_id(self, Utc::now())?;
        Ok(PipelineRun::new(run_id, total_files, mode, config))
    }

    /// Summaries of all runs, oldest first
    fn list_summaries(&self) -> Result<Vec<RunSummary>> {
        Ok(self.list_runs()?.iter().map(RunSummary::from).collect())
    }

    /// Most recent run of any status
    fn latest_run(&self) -> Result<Option<PipelineRun>> {
        Ok(self.list_runs()?.pop())
    }

    /// Most recent run that recorded failures (`failed > 0` or status `failed`)
    fn get_last_failed_run(&self) -> Result<Option<PipelineRun>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .rev()
            .find(PipelineRun::has_failures))
    }

    /// Failed and skipped files of a run, in processing order.
    ///
    /// An unknown run yields an empty list.
    fn get_failed_files(&self, run_id: &str) -> Result<Vec<FileResult>> {
        Ok(self
            .get_run(run_id)?
            .map(|run| run.files_needing_retry())
            .unwrap_or_default())
    }
}

/// Chronological order used by every backend
pub(crate) fn sort_chronologically(runs: &mut [PipelineRun]) {
    runs.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}
