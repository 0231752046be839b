//! # Mender Vector Store
//!
//! Embeds code chunks into fixed-dimension vectors and answers top-K
//! similarity queries over them.
//!
//! ## Architecture
//!
//! ```text
//! CodeChunk[]
//!     │
//!     ├──> EmbeddingModel
//!     │      ├─> Local model (all-MiniLM-L6-v2, `local-model` feature)
//!     │      └─> Deterministic fallback (sha256 seed → PRNG)
//!     │             └─> Vector[384], unit length
//!     │
//!     ├──> NearestNeighborIndex
//!     │      ├─> FlatIndex (exact L2 over an ndarray matrix)
//!     │      └─> BruteForceIndex (dot product over stored rows)
//!     │
//!     └──> Persistent Storage (JSON)
//! ```
//!
//! The fallback embedder carries no semantic signal. It exists so retrieval
//! stays deterministic and runnable offline; treat its rankings as
//! placeholders.
//!
//! ## Example
//!
//! ```no_run
//! use mender_vector_store::{EmbeddingModel, IndexKind, VectorStore};
//! use mender_code_chunker::CodeChunk;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = VectorStore::new(EmbeddingModel::from_env()?, IndexKind::Flat);
//!
//!     let chunks = vec![/* CodeChunk instances */];
//!     store.ingest(chunks).await?;
//!
//!     for result in store.query("null pointer in session refresh", 5).await? {
//!         println!("{}: {:.3}", result.chunk.id(), result.score);
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod index;
mod store;
mod types;

pub use embeddings::{
    fallback_embed, EmbeddingMode, EmbeddingModel, EmbeddingVector, EMBEDDING_DIMENSION,
};
pub use error::{Result, VectorStoreError};
pub use index::{build_index, BruteForceIndex, FlatIndex, IndexKind, Neighbor, NearestNeighborIndex};
pub use store::VectorStore;
pub use types::{SearchResult, StoredChunk};

// Re-export code chunker types for convenience
pub use mender_code_chunker::CodeChunk;
