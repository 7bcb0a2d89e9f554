//! Batch and retry orchestration
//!
//! Both entry points plan a list of files and hand it to the shared executor in
//! [`executor`], which applies the operating mode and records the run.

pub mod batch;
pub mod executor;
pub mod mode;
pub mod operator;
pub mod processor;
pub mod retry;

pub use batch::{BatchPlan, BatchRequest};
pub use executor::{ExecutionOptions, Orchestrator, PlannedFile, FILE_NOT_FOUND, ORCHESTRATION_ERROR};
pub use mode::{FailureDecision, FailurePolicy, OperatingMode};
pub use operator::{Operator, Unattended};
pub use processor::{FileProcessor, ProcessingOutcome, ProcessorError};
pub use retry::{RetryOutcome, RetryRequest};
