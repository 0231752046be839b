use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::types::CodeChunk;
use std::path::Path;

/// Splits file text into overlapping fixed-size line windows
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker, rejecting `overlap >= chunk_size`
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk code from a string
    pub fn chunk_str(&self, content: &str, file_path: &str) -> Result<Vec<CodeChunk>> {
        // Split on '\n' only so CRLF files keep their '\r'
        let mut lines: Vec<&str> = content.split('\n').collect();
        if lines.last() == Some(&"") {
            lines.pop();
        }
        if lines.is_empty() {
            return Err(ChunkerError::EmptyContent);
        }

        let total = lines.len();
        let size = self.config.chunk_size;

        if total <= size {
            return Ok(vec![CodeChunk::new(
                file_path.to_string(),
                1,
                total,
                lines.join("\n"),
            )]);
        }

        let mut chunks = Vec::with_capacity(total / self.config.stride() + 1);
        let mut start = 0;
        loop {
            let end = (start + size).min(total);
            chunks.push(CodeChunk::new(
                file_path.to_string(),
                start + 1,
                end,
                lines[start..end].join("\n"),
            ));

            if end >= total {
                break;
            }
            // overlap < chunk_size keeps this strictly increasing
            start = end - self.config.overlap;
        }

        log::trace!(
            "Chunked {file_path}: {total} lines into {} windows",
            chunks.len()
        );
        Ok(chunks)
    }

    /// Chunk code from a file on disk
    pub fn chunk_file(&self, path: impl AsRef<Path>) -> Result<Vec<CodeChunk>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file_path = path.to_string_lossy();
        self.chunk_str(&content, &file_path)
    }
}
