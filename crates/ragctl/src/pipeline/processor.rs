//! Per-file processor contract

use async_trait::async_trait;
use std::path::Path;

use crate::types::{Metadata, RunConfig};

/// Metrics returned by a successful `process` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingOutcome {
    /// Chunks written for the file
    pub chunks_created: u64,
    /// Processing time in seconds as measured by the processor
    pub duration: f64,
    /// Processor-specific facts recorded with the file result
    pub metadata: Metadata,
}

impl ProcessingOutcome {
    pub fn new(chunks_created: u64) -> Self {
        Self {
            chunks_created,
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Failure reported by a processor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessorError {
    /// This file could not be processed; the run carries on per its mode
    #[error("{message}")]
    File { message: String, kind: String },

    /// Something outside this file broke; the whole run stops
    #[error("{0}")]
    Fatal(String),
}

impl ProcessorError {
    pub fn file(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::File {
            message: message.into(),
            kind: kind.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// The processing step applied to each file of a run
///
/// Implementations:
/// - `ChunkingProcessor`: text chunking to JSON output
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// Process one file with the run's configuration snapshot
    async fn process(&self, path: &Path, config: &RunConfig) -> Result<ProcessingOutcome, ProcessorError>;

    /// Check a configuration snapshot before a run is created
    fn validate_config(&self, _config: &RunConfig) -> Result<(), String> {
        Ok(())
    }

    /// Whether discovery should hand this file to the processor
    fn supports(&self, _path: &Path) -> bool {
        true
    }

    /// Processor name for logging
    fn name(&self) -> &str;
}
