//! Run record model: per-file results and pipeline runs

pub mod file_result;
pub mod pipeline_run;
pub mod status;

pub use file_result::{display_name, FileResult, Metadata};
pub use pipeline_run::{PipelineRun, RunConfig, RunSummary, RETRY_OF_KEY};
pub use status::{FileStatus, PipelineStatus};
