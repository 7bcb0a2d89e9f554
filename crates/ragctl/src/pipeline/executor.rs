//! Shared execution core for batch and retry runs
//!
//! Files are processed strictly in order, one at a time. Every planned file
//! ends up in the run: processed, or marked aborted/skipped when the run stops
//! early. The only exception is an orchestration-level processor error, which
//! ends the run on the spot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::mode::{FailureDecision, FailurePolicy, OperatingMode};
use super::operator::Operator;
use super::processor::{FileProcessor, ProcessingOutcome, ProcessorError};
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::types::{display_name, FileResult, PipelineRun, RunConfig};

/// `error_type` for a file whose path did not resolve at processing time
pub const FILE_NOT_FOUND: &str = "FileNotFound";
/// `error_type` for the file being processed when the run hit a fatal error
pub const ORCHESTRATION_ERROR: &str = "OrchestrationError";

const OPERATOR_STOP_REASON: &str = "run stopped by operator";
const OPERATOR_SKIP_REASON: &str = "skipped by operator";

/// A file scheduled for processing
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    pub filename: String,
    pub filepath: PathBuf,
    /// Previous attempts of this file
    pub retries: u32,
}

impl PlannedFile {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        let filepath = filepath.into();
        Self {
            filename: display_name(&filepath),
            filepath,
            retries: 0,
        }
    }

    /// Plan another attempt of a previously recorded file
    pub fn from_previous(result: &FileResult) -> Self {
        Self {
            filename: result.filename.clone(),
            filepath: result.filepath.clone(),
            retries: result.retries.saturating_add(1),
        }
    }

    fn stamp(&self, result: FileResult) -> FileResult {
        result
            .with_filename(self.filename.clone())
            .with_retries(self.retries)
    }

    fn succeeded(&self, outcome: ProcessingOutcome, duration: f64) -> FileResult {
        self.stamp(FileResult::success(
            &self.filepath,
            outcome.chunks_created,
            duration,
            outcome.metadata,
        ))
    }

    fn failed(&self, message: &str, kind: &str, duration: f64) -> FileResult {
        self.stamp(FileResult::failed(&self.filepath, message, kind, duration))
    }

    fn skipped(&self, reason: impl Into<String>) -> FileResult {
        self.stamp(FileResult::skipped(&self.filepath, reason))
    }

    fn aborted(&self, reason: impl Into<String>) -> FileResult {
        self.stamp(FileResult::aborted(&self.filepath, reason))
    }
}

/// How a run is executed
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    pub mode: OperatingMode,
    /// Configuration snapshot stored with the run and passed to the processor
    pub config: RunConfig,
    /// Persist the finished run
    pub save_history: bool,
    /// Check each path is a readable regular file before processing it
    pub verify_paths: bool,
}

impl ExecutionOptions {
    pub fn new(mode: OperatingMode, config: RunConfig) -> Self {
        Self {
            mode,
            config,
            save_history: true,
            verify_paths: false,
        }
    }

    pub fn with_save_history(mut self, save_history: bool) -> Self {
        self.save_history = save_history;
        self
    }

    pub fn with_verify_paths(mut self, verify_paths: bool) -> Self {
        self.verify_paths = verify_paths;
        self
    }
}

/// What happens to files after the run stops early
#[derive(Debug, Clone)]
enum Remainder {
    Abort(String),
    Skip(String),
}

enum Attempt {
    Succeeded(ProcessingOutcome, f64),
    Failed { message: String, kind: String, duration: f64 },
    Fatal { message: String, duration: f64 },
}

/// Drives files through a [`FileProcessor`] and records runs in a [`HistoryStore`]
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn HistoryStore>,
    processor: Arc<dyn FileProcessor>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn HistoryStore>, processor: Arc<dyn FileProcessor>) -> Self {
        Self { store, processor }
    }

    pub fn store(&self) -> &dyn HistoryStore {
        self.store.as_ref()
    }

    pub fn processor(&self) -> &dyn FileProcessor {
        self.processor.as_ref()
    }

    /// Reject a configuration snapshot the processor cannot work with
    pub(crate) fn check_config(&self, config: &RunConfig) -> Result<()> {
        self.processor
            .validate_config(config)
            .map_err(Error::InvalidConfig)
    }

    /// Process `files` in order under `options` and return the finished run.
    ///
    /// Per-file failures are recorded, never returned. A fatal processor error
    /// yields [`Error::Orchestration`]; a failed save yields [`Error::Unsaved`].
    /// Both carry the run.
    pub async fn execute(
        &self,
        files: Vec<PlannedFile>,
        options: &ExecutionOptions,
        operator: &mut dyn Operator,
    ) -> Result<PipelineRun> {
        self.check_config(&options.config)?;

        let total = files.len();
        let mut run = self
            .store
            .create_run(total, options.mode, options.config.clone())?;
        let started = Instant::now();

        tracing::info!(
            "Starting run {} with {} files in {} mode (processor: {})",
            run.run_id,
            total,
            options.mode,
            self.processor.name()
        );
        run.start()?;

        let mut pending = files.iter().enumerate();
        let mut remainder = None;

        for (index, file) in pending.by_ref() {
            let position = index + 1;
            operator.file_started(file, position, total);
            tracing::debug!("Processing {} ({}/{})", file.filepath.display(), position, total);

            let (message, kind, duration) = match self.attempt(file, options).await {
                Attempt::Succeeded(outcome, duration) => {
                    let result = file.succeeded(outcome, duration);
                    record(&mut run, operator, result, position, total)?;
                    continue;
                }
                Attempt::Failed { message, kind, duration } => (message, kind, duration),
                Attempt::Fatal { message, duration } => {
                    let result = file.failed(&message, ORCHESTRATION_ERROR, duration);
                    record(&mut run, operator, result, position, total)?;
                    return Err(self.abort_run(run, message, started, options.save_history));
                }
            };

            tracing::error!("Failed to process {}: {}", file.filename, message);

            remainder = match options.mode.on_failure() {
                FailurePolicy::RecordFailedAndContinue => {
                    record(&mut run, operator, file.failed(&message, &kind, duration), position, total)?;
                    None
                }
                FailurePolicy::RecordSkippedAndContinue => {
                    let result = file
                        .skipped(format!("auto-skip: {}", message))
                        .with_error(message, kind, duration);
                    record(&mut run, operator, result, position, total)?;
                    None
                }
                FailurePolicy::AbortRemainder => {
                    record(&mut run, operator, file.failed(&message, &kind, duration), position, total)?;
                    Some(Remainder::Abort(format!(
                        "auto-stop: run stopped after {} failed",
                        file.filename
                    )))
                }
                FailurePolicy::AskOperator => {
                    let result = file.failed(&message, &kind, duration);
                    record(&mut run, operator, result.clone(), position, total)?;
                    match operator.decide_after_failure(&result, position, total) {
                        FailureDecision::Continue => None,
                        FailureDecision::Stop => Some(Remainder::Abort(OPERATOR_STOP_REASON.into())),
                        FailureDecision::SkipRest => Some(Remainder::Skip(OPERATOR_SKIP_REASON.into())),
                    }
                }
            };

            if remainder.is_some() {
                break;
            }
        }

        if let Some(remainder) = remainder {
            for (index, file) in pending {
                let result = match &remainder {
                    Remainder::Abort(reason) => file.aborted(reason.clone()),
                    Remainder::Skip(reason) => file.skipped(reason.clone()),
                };
                record(&mut run, operator, result, index + 1, total)?;
            }
        }

        let status = run.finish(started.elapsed().as_secs_f64())?;
        tracing::info!(
            "Run {} finished with status {}: {} succeeded, {} failed, {} skipped, {} aborted in {:.2}s",
            run.run_id,
            status,
            run.success,
            run.failed,
            run.skipped,
            run.aborted,
            run.duration
        );

        if options.save_history {
            if let Err(e) = self.store.save_run(&run) {
                tracing::error!("Failed to save run {}: {}", run.run_id, e);
                return Err(Error::Unsaved {
                    run: Box::new(run),
                    source: Box::new(e),
                });
            }
        }

        Ok(run)
    }

    async fn attempt(&self, file: &PlannedFile, options: &ExecutionOptions) -> Attempt {
        let started = Instant::now();

        if options.verify_paths {
            if let Err(message) = verify_readable(&file.filepath).await {
                return Attempt::Failed {
                    message,
                    kind: FILE_NOT_FOUND.to_string(),
                    duration: started.elapsed().as_secs_f64(),
                };
            }
        }

        let result = self.processor.process(&file.filepath, &options.config).await;
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(outcome) => {
                let duration = if outcome.duration.is_finite() && outcome.duration > 0.0 {
                    outcome.duration
                } else {
                    elapsed
                };
                Attempt::Succeeded(outcome, duration)
            }
            Err(ProcessorError::File { message, kind }) => Attempt::Failed {
                message,
                kind,
                duration: elapsed,
            },
            Err(ProcessorError::Fatal(message)) => Attempt::Fatal {
                message,
                duration: elapsed,
            },
        }
    }

    /// Fail the run, persist it where possible and wrap it in the returned error
    fn abort_run(&self, mut run: PipelineRun, message: String, started: Instant, save: bool) -> Error {
        if let Err(e) = run.fail(started.elapsed().as_secs_f64()) {
            return e;
        }
        tracing::error!("Run {} aborted: {}", run.run_id, message);

        let saved = !save
            || match self.store.save_run(&run) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("Failed to save aborted run {}: {}", run.run_id, e);
                    false
                }
            };

        Error::Orchestration {
            message,
            run: Box::new(run),
            saved,
        }
    }
}

fn record(
    run: &mut PipelineRun,
    operator: &mut dyn Operator,
    result: FileResult,
    position: usize,
    total: usize,
) -> Result<()> {
    run.record(result)?;
    if let Some(recorded) = run.files.last() {
        operator.file_finished(recorded, position, total);
    }
    Ok(())
}

async fn verify_readable(path: &Path) -> std::result::Result<(), String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("File not found: {} ({})", path.display(), e))?;
    if !metadata.is_file() {
        return Err(format!("Not a regular file: {}", path.display()));
    }
    tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("File is not readable: {} ({})", path.display(), e))?;
    Ok(())
}
