//! Bundled per-file processing: text chunking

mod chunker;
mod processor;

pub use chunker::{TextChunk, TextChunker};
pub use processor::{
    is_supported_file, ChunkingProcessor, DECODE_ERROR, DEFAULT_OUTPUT_DIR, EMPTY_CONTENT,
    READ_ERROR, SINGLE_FILE_NAME, TEXT_EXTENSIONS, WRITE_ERROR,
};
