//! Per-file outcome recorded inside a pipeline run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::FileStatus;

/// Open key/value map for processor-specific facts (OCR engine, content hash, ...)
pub type Metadata = serde_json::Map<String, Value>;

/// Outcome of processing one file
///
/// Built once when the attempt concludes and owned by the run that contains
/// it. The constructors uphold the status invariants: failed results carry an
/// `error`, skipped results carry a `reason`, successful results carry neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    /// Display name
    pub filename: String,
    /// Path the file was read from
    pub filepath: PathBuf,
    /// Outcome
    pub status: FileStatus,
    /// Number of chunks produced
    #[serde(default)]
    pub chunks_created: u64,
    /// Processing time in seconds
    #[serde(default)]
    pub duration: f64,
    /// How many earlier runs already tried this file
    #[serde(default)]
    pub retries: u32,
    /// Error message (failed files)
    #[serde(default)]
    pub error: Option<String>,
    /// Error classification tag
    #[serde(default)]
    pub error_type: Option<String>,
    /// Human explanation for a skip or abort
    #[serde(default)]
    pub reason: Option<String>,
    /// Processor-specific facts
    #[serde(default)]
    pub metadata: Metadata,
}

impl FileResult {
    fn base(filepath: &Path, status: FileStatus) -> Self {
        Self {
            filename: display_name(filepath),
            filepath: filepath.to_path_buf(),
            status,
            chunks_created: 0,
            duration: 0.0,
            retries: 0,
            error: None,
            error_type: None,
            reason: None,
            metadata: Metadata::new(),
        }
    }

    /// Result for a successfully processed file
    pub fn success(
        filepath: &Path,
        chunks_created: u64,
        duration: f64,
        metadata: Metadata,
    ) -> Self {
        Self {
            chunks_created,
            duration,
            metadata,
            ..Self::base(filepath, FileStatus::Success)
        }
    }

    /// Result for a file whose processing failed
    pub fn failed(
        filepath: &Path,
        error: impl Into<String>,
        error_type: impl Into<String>,
        duration: f64,
    ) -> Self {
        Self {
            duration,
            error: Some(error.into()),
            error_type: Some(error_type.into()),
            ..Self::base(filepath, FileStatus::Failed)
        }
    }

    /// Result for a file that was not processed, or whose failure was tolerated
    pub fn skipped(filepath: &Path, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::base(filepath, FileStatus::Skipped)
        }
    }

    /// Result for a file that was never attempted because the run stopped
    pub fn aborted(filepath: &Path, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::base(filepath, FileStatus::Aborted)
        }
    }

    /// Override the display name
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Set the retry count
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Keep the error that caused a tolerated skip
    pub fn with_error(
        mut self,
        error: impl Into<String>,
        error_type: impl Into<String>,
        duration: f64,
    ) -> Self {
        self.error = Some(error.into());
        self.error_type = Some(error_type.into());
        self.duration = duration;
        self
    }

    /// Check the status invariants and numeric ranges
    pub fn validate(&self) -> Result<(), String> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(format!(
                "{}: duration must be a non-negative number, got {}",
                self.filename, self.duration
            ));
        }
        match self.status {
            FileStatus::Failed if self.error.is_none() => {
                Err(format!("{}: failed result has no error", self.filename))
            }
            FileStatus::Skipped if self.reason.is_none() => {
                Err(format!("{}: skipped result has no reason", self.filename))
            }
            FileStatus::Success if self.error.is_some() || self.reason.is_some() => Err(format!(
                "{}: successful result carries an error or reason",
                self.filename
            )),
            _ => Ok(()),
        }
    }
}

/// File name component used for display, falling back to the full path
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
