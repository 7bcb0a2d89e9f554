//! Chunking processor used by the `ragctl` binary
//!
//! Reads a UTF-8 text file, chunks it and writes the chunks as JSON into the
//! run's output directory.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::chunker::{TextChunk, TextChunker};
use crate::config::{keys, ChunkingConfig};
use crate::discovery::validate_output_path;
use crate::pipeline::{FileProcessor, ProcessingOutcome, ProcessorError};
use crate::types::{display_name, RunConfig};

/// Extensions handled as plain text (case-insensitive)
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "json", "html", "htm", "xml", "log",
];

/// Output directory used when the run config names none
pub const DEFAULT_OUTPUT_DIR: &str = "ragctl-output";

/// Combined output file in single-file mode
pub const SINGLE_FILE_NAME: &str = "chunks.jsonl";

pub const READ_ERROR: &str = "ReadError";
pub const DECODE_ERROR: &str = "DecodeError";
pub const EMPTY_CONTENT: &str = "EmptyContent";
pub const WRITE_ERROR: &str = "WriteError";

/// Whether `path` has one of the [`TEXT_EXTENSIONS`]
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Settings resolved from a run config snapshot
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    chunking: ChunkingConfig,
    output: PathBuf,
    single_file: bool,
}

#[derive(Serialize)]
struct ChunkFile<'a> {
    source: &'a Path,
    filename: String,
    content_hash: &'a str,
    strategy: &'a str,
    max_tokens: usize,
    overlap: usize,
    chunks: &'a [TextChunk],
}

#[derive(Serialize)]
struct ChunkLine<'a> {
    source: &'a Path,
    filename: &'a str,
    content_hash: &'a str,
    #[serde(flatten)]
    chunk: &'a TextChunk,
}

/// Text chunking processor
pub struct ChunkingProcessor {
    defaults: ChunkingConfig,
    default_output: PathBuf,
    append_lock: Mutex<()>,
}

impl ChunkingProcessor {
    pub fn new(defaults: ChunkingConfig) -> Self {
        Self {
            defaults,
            default_output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            append_lock: Mutex::new(()),
        }
    }

    /// Output directory used when the run config has no `output` key
    pub fn with_default_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.default_output = output.into();
        self
    }

    fn settings(&self, config: &RunConfig) -> Result<Settings, String> {
        let chunking =
            ChunkingConfig::from_run_config(config, &self.defaults).map_err(|e| e.to_string())?;

        let output = match config.get(keys::OUTPUT) {
            None | Some(Value::Null) => self.default_output.clone(),
            Some(Value::String(path)) => PathBuf::from(path),
            Some(other) => return Err(format!("output must be a path string, got {}", other)),
        };

        let single_file = match config.get(keys::SINGLE_FILE) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => return Err(format!("single_file must be a boolean, got {}", other)),
        };

        Ok(Settings {
            chunking,
            output,
            single_file,
        })
    }

    async fn write_document(
        &self,
        path: &Path,
        settings: &Settings,
        content_hash: &str,
        chunks: &[TextChunk],
    ) -> Result<PathBuf, ProcessorError> {
        let write_error = |e: std::io::Error| ProcessorError::file(format!("Failed to write chunks: {}", e), WRITE_ERROR);
        let filename = display_name(path);

        if settings.single_file {
            let target = settings.output.join(SINGLE_FILE_NAME);
            let mut payload = Vec::new();
            for chunk in chunks {
                let line = ChunkLine {
                    source: path,
                    filename: &filename,
                    content_hash,
                    chunk,
                };
                serde_json::to_writer(&mut payload, &line)
                    .map_err(|e| ProcessorError::file(e.to_string(), WRITE_ERROR))?;
                payload.push(b'\n');
            }

            let _guard = self.append_lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&target)
                .await
                .map_err(write_error)?;
            file.write_all(&payload).await.map_err(write_error)?;
            file.flush().await.map_err(write_error)?;
            return Ok(target);
        }

        let target = document_target(&settings.output, path, &filename).await;
        let document = ChunkFile {
            source: path,
            filename,
            content_hash,
            strategy: settings.chunking.strategy.as_str(),
            max_tokens: settings.chunking.max_tokens,
            overlap: settings.chunking.overlap,
            chunks,
        };
        let payload = serde_json::to_vec_pretty(&document)
            .map_err(|e| ProcessorError::file(e.to_string(), WRITE_ERROR))?;
        tokio::fs::write(&target, payload).await.map_err(write_error)?;
        Ok(target)
    }
}

/// Chunk document path for `path` inside `output`
///
/// `<stem>.chunks.json` unless that file already holds the chunks of another
/// source, in which case a short hash of the source path is added.
async fn document_target(output: &Path, path: &Path, filename: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let plain = output.join(format!("{}.chunks.json", stem));

    let existing = match tokio::fs::read(&plain).await {
        Ok(bytes) => bytes,
        Err(_) => return plain,
    };
    let same_source = serde_json::from_slice::<Value>(&existing)
        .ok()
        .and_then(|doc| doc.get("source").and_then(Value::as_str).map(PathBuf::from))
        .is_some_and(|source| source == path);
    if same_source {
        return plain;
    }

    let digest = hex::encode(Sha256::digest(path.to_string_lossy().as_bytes()));
    output.join(format!("{}.{}.chunks.json", stem, &digest[..8]))
}

impl Default for ChunkingProcessor {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

#[async_trait]
impl FileProcessor for ChunkingProcessor {
    async fn process(&self, path: &Path, config: &RunConfig) -> Result<ProcessingOutcome, ProcessorError> {
        let started = Instant::now();
        let settings = self.settings(config).map_err(ProcessorError::Fatal)?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProcessorError::file(format!("Failed to read {}: {}", path.display(), e), READ_ERROR))?;
        let text = std::str::from_utf8(&bytes).map_err(|e| {
            ProcessorError::file(format!("{} is not valid UTF-8: {}", path.display(), e), DECODE_ERROR)
        })?;
        if text.trim().is_empty() {
            return Err(ProcessorError::file(
                format!("{} has no text content", path.display()),
                EMPTY_CONTENT,
            ));
        }

        let chunks = TextChunker::from_config(&settings.chunking).chunk(text);
        if chunks.is_empty() {
            return Err(ProcessorError::file(
                format!("No chunks produced for {}", path.display()),
                EMPTY_CONTENT,
            ));
        }

        // The output directory is shared by every file of the run
        tokio::fs::create_dir_all(&settings.output).await.map_err(|e| {
            ProcessorError::fatal(format!(
                "Failed to create output directory {}: {}",
                settings.output.display(),
                e
            ))
        })?;

        let content_hash = hex::encode(Sha256::digest(&bytes));
        let target = self.write_document(path, &settings, &content_hash, &chunks).await?;

        tracing::debug!(
            "Chunked {} into {} chunks ({} strategy) -> {}",
            path.display(),
            chunks.len(),
            settings.chunking.strategy,
            target.display()
        );

        Ok(ProcessingOutcome::new(chunks.len() as u64)
            .with_duration(started.elapsed().as_secs_f64())
            .with_metadata("content_hash", content_hash)
            .with_metadata("strategy", settings.chunking.strategy.as_str())
            .with_metadata("bytes", bytes.len() as u64)
            .with_metadata("output", target.display().to_string()))
    }

    fn validate_config(&self, config: &RunConfig) -> Result<(), String> {
        let settings = self.settings(config)?;
        validate_output_path(&settings.output).map_err(|e| e.to_string())
    }

    fn supports(&self, path: &Path) -> bool {
        is_supported_file(path)
    }

    fn name(&self) -> &str {
        "chunking"
    }
}
