//! # Mender Indexer
//!
//! Turns a repository checkout into the flat chunk list the retrievers rank.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> File Scanner (.gitignore aware, denylists, size cap)
//!     │      └─> Candidate files
//!     │
//!     ├──> UTF-8 decode (undecodable files skipped)
//!     │
//!     └──> Chunker (line windows)
//!            └─> CodeChunk[] with repository-relative paths
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mender_code_chunker::ChunkerConfig;
//! use mender_indexer::RepositoryIngestor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ingestor = RepositoryIngestor::new("/path/to/checkout", ChunkerConfig::default())?;
//!     let (chunks, stats) = ingestor.ingest().await?;
//!
//!     println!("{} files, {} chunks", stats.files, chunks.len());
//!     Ok(())
//! }
//! ```

mod error;
mod ingest;
mod scanner;
mod stats;

pub use error::{IndexerError, Result};
pub use ingest::RepositoryIngestor;
pub use scanner::FileScanner;
pub use stats::IngestStats;
