//! Status enums for files and pipeline runs
//!
//! Both serialize to fixed lowercase tokens. Unknown tokens are rejected on
//! read instead of falling back to a default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one file within a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Processed successfully
    Success,
    /// Processing failed
    Failed,
    /// Not processed, with a recorded reason
    Skipped,
    /// Not attempted because the run was stopped
    Aborted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
            FileStatus::Aborted => "aborted",
        }
    }

    /// Whether a later retry should pick this file up
    pub fn needs_retry(&self) -> bool {
        matches!(self, FileStatus::Failed | FileStatus::Skipped)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FileStatus::Success),
            "failed" => Ok(FileStatus::Failed),
            "skipped" => Ok(FileStatus::Skipped),
            "aborted" => Ok(FileStatus::Aborted),
            other => Err(format!("unknown file status '{}'", other)),
        }
    }
}

/// Lifecycle status of a pipeline run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Initializing,
    Running,
    Done,
    Failed,
    Aborted,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Initializing => "initializing",
            PipelineStatus::Running => "running",
            PipelineStatus::Done => "done",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Aborted => "aborted",
        }
    }

    /// Terminal runs are frozen: counters and files no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Done | PipelineStatus::Failed | PipelineStatus::Aborted
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(PipelineStatus::Initializing),
            "running" => Ok(PipelineStatus::Running),
            "done" => Ok(PipelineStatus::Done),
            "failed" => Ok(PipelineStatus::Failed),
            "aborted" => Ok(PipelineStatus::Aborted),
            other => Err(format!("unknown pipeline status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_tokens() {
        for status in [
            FileStatus::Success,
            FileStatus::Failed,
            FileStatus::Skipped,
            FileStatus::Aborted,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
            assert_eq!(status.as_str().parse::<FileStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        assert!(serde_json::from_str::<FileStatus>("\"SUCCESS\"").is_err());
        assert!(serde_json::from_str::<PipelineStatus>("\"complete\"").is_err());
        assert!("pending".parse::<PipelineStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PipelineStatus::Initializing.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(PipelineStatus::Done.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_needs_retry() {
        assert!(FileStatus::Failed.needs_retry());
        assert!(FileStatus::Skipped.needs_retry());
        assert!(!FileStatus::Success.needs_retry());
        assert!(!FileStatus::Aborted.needs_retry());
    }
}
