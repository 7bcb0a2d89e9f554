//! Pipeline run record: one execution of the batch or retry orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FileResult, FileStatus, PipelineStatus};
use crate::error::{Error, Result};
use crate::pipeline::OperatingMode;

/// Snapshot of the processing configuration used by a run
pub type RunConfig = serde_json::Map<String, Value>;

/// Config key linking a retry run to the run it retried
pub const RETRY_OF_KEY: &str = "retry_of";

/// One execution of the orchestrator
///
/// Counters are updated together with `files` by [`PipelineRun::record`]; once
/// the status is terminal both are frozen. `total_files` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique, chronologically sortable identifier
    pub run_id: String,
    /// Creation instant
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Lifecycle status
    pub status: PipelineStatus,
    /// Number of files planned at creation
    pub total_files: usize,
    #[serde(default)]
    pub success: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub aborted: usize,
    /// Total elapsed seconds, set at completion
    #[serde(default)]
    pub duration: f64,
    /// Operating mode the run executed under
    #[serde(default)]
    pub mode: OperatingMode,
    /// Processing configuration snapshot
    #[serde(default)]
    pub config: RunConfig,
    /// Per-file results in processing order
    #[serde(default)]
    pub files: Vec<FileResult>,
}

impl PipelineRun {
    /// Create a run in `Initializing` state
    pub fn new(
        run_id: impl Into<String>,
        total_files: usize,
        mode: OperatingMode,
        config: RunConfig,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            status: PipelineStatus::Initializing,
            total_files,
            success: 0,
            failed: 0,
            skipped: 0,
            aborted: 0,
            duration: 0.0,
            mode,
            config,
            files: Vec::new(),
        }
    }

    /// Files accounted for so far
    pub fn processed(&self) -> usize {
        self.success + self.failed + self.skipped + self.aborted
    }

    /// Share of processed files that succeeded, `0.0` when nothing was processed
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            return 0.0;
        }
        self.success as f64 / processed as f64
    }

    /// Planned files not yet accounted for
    pub fn remaining(&self) -> usize {
        self.total_files.saturating_sub(self.processed())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this run recorded failures
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.status == PipelineStatus::Failed
    }

    /// Id of the run this one retried, if any
    pub fn retry_of(&self) -> Option<&str> {
        self.config.get(RETRY_OF_KEY).and_then(Value::as_str)
    }

    /// Move from `Initializing` to `Running`
    pub fn start(&mut self) -> Result<()> {
        match self.status {
            PipelineStatus::Initializing => {
                self.status = PipelineStatus::Running;
                Ok(())
            }
            PipelineStatus::Running => Ok(()),
            _ => Err(Error::RunFrozen(self.run_id.clone())),
        }
    }

    /// Append a file result and bump the matching counter
    pub fn record(&mut self, result: FileResult) -> Result<()> {
        if self.is_finished() {
            return Err(Error::RunFrozen(self.run_id.clone()));
        }
        if self.status != PipelineStatus::Running {
            return Err(Error::internal(format!(
                "run {} has not been started",
                self.run_id
            )));
        }
        if self.processed() >= self.total_files {
            return Err(Error::internal(format!(
                "run {} already accounts for all {} planned files",
                self.run_id, self.total_files
            )));
        }

        match result.status {
            FileStatus::Success => self.success += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Aborted => self.aborted += 1,
        }
        self.files.push(result);
        Ok(())
    }

    /// Close the run, deriving the terminal status from the recorded files
    ///
    /// Any aborted file makes the run `Aborted`; otherwise any failed file makes
    /// it `Failed`; otherwise it is `Done`.
    pub fn finish(&mut self, duration: f64) -> Result<PipelineStatus> {
        let status = if self.aborted > 0 {
            PipelineStatus::Aborted
        } else if self.failed > 0 {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Done
        };
        self.close(status, duration)?;
        Ok(status)
    }

    /// Close the run as `Failed` regardless of file outcomes
    pub fn fail(&mut self, duration: f64) -> Result<()> {
        self.close(PipelineStatus::Failed, duration)
    }

    fn close(&mut self, status: PipelineStatus, duration: f64) -> Result<()> {
        if self.is_finished() {
            return Err(Error::RunFrozen(self.run_id.clone()));
        }
        self.status = status;
        self.duration = duration.max(0.0);
        Ok(())
    }

    /// Files whose status calls for a retry, in processing order
    pub fn files_needing_retry(&self) -> Vec<FileResult> {
        self.files
            .iter()
            .filter(|f| f.status.needs_retry())
            .cloned()
            .collect()
    }

    /// Serialize the full record, including nested files
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a run from its serialized record, checking the record invariants
    pub fn from_value(value: Value) -> Result<Self> {
        let run_id = value
            .get("run_id")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        let run: PipelineRun = serde_json::from_value(value)
            .map_err(|e| Error::invalid_record(&run_id, e.to_string()))?;
        run.validate()?;
        Ok(run)
    }

    /// Check counters, durations and per-file invariants
    pub fn validate(&self) -> Result<()> {
        if self.run_id.is_empty() {
            return Err(Error::invalid_record("<empty>", "run_id is empty"));
        }
        if self.processed() > self.total_files {
            return Err(Error::invalid_record(
                &self.run_id,
                format!(
                    "processed files ({}) exceed total_files ({})",
                    self.processed(),
                    self.total_files
                ),
            ));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(Error::invalid_record(
                &self.run_id,
                format!("invalid duration {}", self.duration),
            ));
        }
        for file in &self.files {
            file.validate()
                .map_err(|message| Error::invalid_record(&self.run_id, message))?;
        }
        Ok(())
    }

    /// Compact view used by listings
    pub fn summary(&self) -> RunSummary {
        RunSummary::from(self)
    }
}

/// Summary of a run for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: PipelineStatus,
    pub mode: OperatingMode,
    pub total_files: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

impl From<&PipelineRun> for RunSummary {
    fn from(run: &PipelineRun) -> Self {
        Self {
            run_id: run.run_id.clone(),
            timestamp: run.timestamp,
            status: run.status,
            mode: run.mode,
            total_files: run.total_files,
            success: run.success,
            failed: run.failed,
            skipped: run.skipped,
            aborted: run.aborted,
            duration: run.duration,
            retry_of: run.retry_of().map(String::from),
        }
    }
}

/// RFC 3339 on write; RFC 3339 or offset-less ISO-8601 (read as UTC) on read
mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub(super) fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
    }
}
