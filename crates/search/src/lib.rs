//! # Mender Search
//!
//! Ranks repository chunks against a natural-language defect description.
//!
//! ## Modes
//!
//! - **Lexical**: weighted keyword scoring (content, path, source extension,
//!   explicitly mentioned files), stable top-K selection
//! - **Semantic**: nearest neighbors from a [`mender_vector_store::VectorStore`]
//! - **Hybrid**: reciprocal-rank fusion (k = 60) of the two rankings
//!
//! Scoring always sees full chunk content; chunks over the character budget
//! are truncated afterwards.
//!
//! ## Example
//!
//! ```
//! use mender_code_chunker::CodeChunk;
//! use mender_search::LexicalScorer;
//!
//! let chunks = vec![
//!     CodeChunk::new("src/auth/login.py".into(), 1, 2, "def login(user):\n    pass".into()),
//!     CodeChunk::new("docs/intro.md".into(), 1, 1, "Welcome".into()),
//! ];
//!
//! let top = LexicalScorer::default().select(chunks, "login fails in src/auth/login.py", 1);
//! assert_eq!(top[0].file_path, "src/auth/login.py");
//! ```

mod error;
mod fusion;
mod lexical;
mod retriever;

pub use error::{Result, SearchError};
pub use fusion::RRFFusion;
pub use lexical::{
    extract_keywords, mentioned_files, truncate_content, LexicalScorer, QueryTerms,
    DEFAULT_MAX_CHARS_PER_CHUNK,
};
pub use retriever::{RetrievalMode, Retriever};
