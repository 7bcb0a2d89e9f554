//! Error types for the batch pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::types::PipelineRun;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
///
/// Per-file processing failures are not represented here: they are recorded
/// into the run as [`FileResult`](crate::types::FileResult)s.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run configuration snapshot rejected by the processor
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    /// Pre-flight validation of a path, pattern or file set failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested run does not exist in history
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// No run in history recorded failures
    #[error("No failed runs found")]
    NoFailedRuns,

    /// Discovery produced nothing to process
    #[error("No files found matching '{pattern}' in {}", directory.display())]
    NoFilesDiscovered { directory: PathBuf, pattern: String },

    /// A persisted run record could not be decoded or violates the record invariants
    #[error("Invalid history record '{run_id}': {message}")]
    InvalidRecord { run_id: String, message: String },

    /// Attempt to mutate a run that already reached a terminal status
    #[error("Run {0} is finished and can no longer be modified")]
    RunFrozen(String),

    /// The run completed but could not be written to history
    #[error("Run {} completed but could not be saved: {source}", run.run_id)]
    Unsaved {
        run: Box<PipelineRun>,
        #[source]
        source: Box<Error>,
    },

    /// An error not tied to a single file stopped the run
    ///
    /// `saved` is false when the failed run should have been recorded in
    /// history but the save did not succeed.
    #[error(
        "Run {} aborted: {message}{}",
        run.run_id,
        if *saved { "" } else { " (the failed run could not be saved to history)" }
    )]
    Orchestration {
        message: String,
        run: Box<PipelineRun>,
        saved: bool,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid record error
    pub fn invalid_record(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            run_id: run_id.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The run carried by this error, if the failure happened after a run was created
    pub fn run(&self) -> Option<&PipelineRun> {
        match self {
            Error::Unsaved { run, .. } | Error::Orchestration { run, .. } => Some(run),
            _ => None,
        }
    }

    /// Process exit code for this error
    ///
    /// `1` when the command could not work out what to do (resolution or
    /// validation), `2` when storage or the run itself failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_)
            | Error::InvalidConfig(_)
            | Error::Validation(_)
            | Error::RunNotFound(_)
            | Error::NoFailedRuns
            | Error::NoFilesDiscovered { .. } => 1,
            Error::InvalidRecord { .. }
            | Error::RunFrozen(_)
            | Error::Unsaved { .. }
            | Error::Orchestration { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::Sqlite(_)
            | Error::Internal(_) => 2,
        }
    }
}
