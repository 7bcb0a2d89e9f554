//! Operator callbacks
//!
//! The executor never talks to a terminal. Decisions that need a human (the
//! interactive failure prompt and the retry confirmation) and progress
//! notifications go through an [`Operator`].

use super::executor::PlannedFile;
use super::mode::FailureDecision;
use crate::types::{FileResult, PipelineRun};

/// Front end consulted by the orchestrator
///
/// `position` is 1-based; `total` is the planned file count of the run.
#[cfg_attr(test, mockall::automock)]
pub trait Operator: Send {
    /// Interactive mode only: what to do after `failed` did not succeed
    fn decide_after_failure(
        &mut self,
        failed: &FileResult,
        position: usize,
        total: usize,
    ) -> FailureDecision;

    /// Whether to go ahead and reprocess `candidates` from `source`
    fn confirm_retry(&mut self, source: &PipelineRun, candidates: &[FileResult]) -> bool;

    /// A file is about to be processed
    fn file_started(&mut self, _file: &PlannedFile, _position: usize, _total: usize) {}

    /// A file result was recorded
    fn file_finished(&mut self, _result: &FileResult, _position: usize, _total: usize) {}

    /// A retry resolved its source run and found `candidates` to reprocess
    fn retry_resolved(&mut self, _source: &PipelineRun, _candidates: &[FileResult]) {}
}

/// Operator for runs without a human attached
///
/// Stops the run if asked about a failure and declines retry confirmations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended;

impl Operator for Unattended {
    fn decide_after_failure(&mut self, failed: &FileResult, _position: usize, _total: usize) -> FailureDecision {
        tracing::warn!(
            "No operator available to decide after failure of {}; stopping run",
            failed.filename
        );
        FailureDecision::Stop
    }

    fn confirm_retry(&mut self, _source: &PipelineRun, _candidates: &[FileResult]) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OperatingMode;
    use crate::types::RunConfig;
    use std::path::Path;

    #[test]
    fn test_unattended_is_conservative() {
        let mut operator = Unattended;
        let failed = FileResult::failed(Path::new("a.txt"), "boom", "ParseError", 0.0);
        assert_eq!(operator.decide_after_failure(&failed, 1, 3), FailureDecision::Stop);

        let run = PipelineRun::new("run_x", 1, OperatingMode::AutoContinue, RunConfig::new());
        assert!(!operator.confirm_retry(&run, &[failed]));
    }

    #[test]
    fn test_notifications_default_to_noop() {
        let mut operator = Unattended;
        let planned = PlannedFile::new(Path::new("/data/a.txt"));
        operator.file_started(&planned, 1, 1);
        operator.file_finished(&FileResult::skipped(Path::new("/data/a.txt"), "x"), 1, 1);
    }
}
