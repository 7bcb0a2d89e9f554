//! ragctl: batch ingestion pipeline with durable run history
//!
//! A batch discovers files in a directory and hands each to a
//! [`FileProcessor`]. Every run is recorded in a [`HistoryStore`] with one
//! result per file, so the failed and skipped files of any run can be
//! reprocessed later with [`Orchestrator::retry`].
//!
//! The bundled [`ChunkingProcessor`] splits text documents into overlapping
//! chunks and writes them as JSON.

pub mod config;
pub mod discovery;
pub mod error;
pub mod history;
pub mod ingestion;
pub mod pipeline;
pub mod types;

pub use config::{AppConfig, ChunkStrategy, ChunkingConfig, HistoryBackend, HistoryConfig, SecurityConfig};
pub use error::{Error, Result};
pub use history::{open_store, HistoryStore, JsonHistoryStore, SqliteHistoryStore};
pub use ingestion::{ChunkingProcessor, TextChunk, TextChunker};
pub use pipeline::{
    BatchPlan, BatchRequest, FailureDecision, FileProcessor, OperatingMode, Operator, Orchestrator,
    ProcessingOutcome, ProcessorError, RetryOutcome, RetryRequest, Unattended,
};
pub use types::{FileResult, FileStatus, PipelineRun, PipelineStatus, RunConfig, RunSummary};
