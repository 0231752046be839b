use serde::{Deserialize, Serialize};

/// Window geometry for line-based chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Lines per chunk
    pub chunk_size: usize,

    /// Lines shared between neighbouring chunks (must be < `chunk_size`)
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkerConfig {
    #[must_use]
    pub const fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Smaller windows tuned for embedding models with short context
    #[must_use]
    pub const fn for_embeddings() -> Self {
        Self {
            chunk_size: 100,
            overlap: 10,
        }
    }

    /// Number of lines the window advances between chunks
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }

        if self.overlap >= self.chunk_size {
            return Err(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            ));
        }

        Ok(())
    }
}
