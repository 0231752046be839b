use crate::embeddings::EmbeddingVector;
use mender_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk: CodeChunk,
    pub vector: EmbeddingVector,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    pub score: f32,
    /// Position of the chunk in ingestion order
    pub idx: usize,
}
