//! # Mender Code Chunker
//!
//! Splits source files into overlapping, fixed-size line windows, the unit of
//! retrieval for the rest of the engine.
//!
//! ## Windowing
//!
//! ```text
//! lines:   1 ─────────── 10
//!                    8 ─────────── 17
//!                               15 ───── 21
//!          chunk_size = 10, overlap = 3
//! ```
//!
//! Chunk `i + 1` starts `overlap` lines before chunk `i` ends. The last window
//! is clipped to the final line of the file, so every line is covered and no
//! chunk runs past the end. Boundaries are purely line-count based.
//!
//! ## Example
//!
//! ```rust
//! use mender_code_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::new(10, 0)).unwrap();
//! let source = (1..=25).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
//!
//! let chunks = chunker.chunk_str(&source, "src/lib.rs").unwrap();
//! let ranges: Vec<_> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
//! assert_eq!(ranges, vec![(1, 10), (11, 20), (21, 25)]);
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::Chunker;
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use types::CodeChunk;
