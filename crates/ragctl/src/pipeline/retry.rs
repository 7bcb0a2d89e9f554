//! Retrying the failed and skipped files of an earlier run
//!
//! The source run is looked up by id, or the most recent run with failures is
//! used. Its configuration is reused with overrides applied, and the new run
//! records the source id under [`RETRY_OF_KEY`].

use serde_json::Value;

use super::executor::{ExecutionOptions, Orchestrator, PlannedFile};
use super::mode::OperatingMode;
use super::operator::Operator;
use crate::error::{Error, Result};
use crate::types::{FileResult, PipelineRun, RunConfig, RETRY_OF_KEY};

/// What to retry and how
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryRequest {
    /// Source run; `None` selects the most recent run with failures
    pub run_id: Option<String>,
    /// Only resolve and report the candidates
    pub show: bool,
    /// Skip the confirmation step
    pub assume_yes: bool,
    pub mode: OperatingMode,
    /// Applied on top of the source run's configuration; `null` removes a key
    pub overrides: RunConfig,
}

impl RetryRequest {
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Self::default()
        }
    }

    pub fn with_show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }

    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_overrides(mut self, overrides: RunConfig) -> Self {
        self.overrides = overrides;
        self
    }
}

/// How a retry ended
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// The source run has no failed or skipped files
    NothingToRetry { source: PipelineRun },
    /// Candidates were resolved and nothing was processed
    DryRun {
        source: PipelineRun,
        candidates: Vec<FileResult>,
    },
    /// The operator declined; no run was created
    Declined {
        source: PipelineRun,
        candidates: Vec<FileResult>,
    },
    /// A new run reprocessed the candidates
    Completed { source: PipelineRun, run: PipelineRun },
}

impl RetryOutcome {
    pub fn source(&self) -> &PipelineRun {
        match self {
            RetryOutcome::NothingToRetry { source }
            | RetryOutcome::DryRun { source, .. }
            | RetryOutcome::Declined { source, .. }
            | RetryOutcome::Completed { source, .. } => source,
        }
    }
}

/// Configuration for a retry of `source`
///
/// Starts from the source snapshot, drops its own linkage, applies `overrides`
/// and links the new run to `source`.
pub fn retry_config(source: &PipelineRun, overrides: &RunConfig) -> RunConfig {
    let mut config = source.config.clone();
    config.remove(RETRY_OF_KEY);
    for (key, value) in overrides {
        if value.is_null() {
            config.remove(key);
        } else {
            config.insert(key.clone(), value.clone());
        }
    }
    config.insert(RETRY_OF_KEY.into(), Value::from(source.run_id.clone()));
    config
}

impl Orchestrator {
    /// The run a retry starts from
    pub fn resolve_source(&self, run_id: Option<&str>) -> Result<PipelineRun> {
        match run_id {
            Some(run_id) => self
                .store()
                .get_run(run_id)?
                .ok_or_else(|| Error::RunNotFound(run_id.to_string())),
            None => self.store().get_last_failed_run()?.ok_or(Error::NoFailedRuns),
        }
    }

    /// Resolve, confirm and reprocess the failed and skipped files of a run
    pub async fn retry(&self, request: &RetryRequest, operator: &mut dyn Operator) -> Result<RetryOutcome> {
        let source = self.resolve_source(request.run_id.as_deref())?;
        let candidates = self.store().get_failed_files(&source.run_id)?;

        if candidates.is_empty() {
            tracing::info!("No failed files in run {}", source.run_id);
            return Ok(RetryOutcome::NothingToRetry { source });
        }
        tracing::info!(
            "Found {} files to retry from run {}",
            candidates.len(),
            source.run_id
        );
        operator.retry_resolved(&source, &candidates);

        if request.show {
            return Ok(RetryOutcome::DryRun { source, candidates });
        }

        let config = retry_config(&source, &request.overrides);
        self.check_config(&config)?;

        if !request.assume_yes && !operator.confirm_retry(&source, &candidates) {
            tracing::info!("Retry of run {} declined", source.run_id);
            return Ok(RetryOutcome::Declined { source, candidates });
        }

        let files = candidates.iter().map(PlannedFile::from_previous).collect();
        let options = ExecutionOptions::new(request.mode, config).with_verify_paths(true);
        let run = self.execute(files, &options, operator).await?;

        Ok(RetryOutcome::Completed { source, run })
    }
}
