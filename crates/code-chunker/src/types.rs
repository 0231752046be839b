use serde::{Deserialize, Serialize};
use std::path::Path;

/// A contiguous line range of one file, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    /// Source file path (repository-relative when produced by ingestion)
    pub file_path: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// The actual code content
    pub content: String,

    /// Relevance assigned by the most recent ranking pass
    #[serde(default)]
    pub relevance_score: f32,
}

impl CodeChunk {
    /// Create a new code chunk with a zero relevance score
    #[must_use]
    pub const fn new(file_path: String, start_line: usize, end_line: usize, content: String) -> Self {
        Self {
            file_path,
            start_line,
            end_line,
            content,
            relevance_score: 0.0,
        }
    }

    /// Stable identity: `path:start:end`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.file_path, self.start_line, self.end_line)
    }

    /// Get the number of lines in this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Check if chunk contains a specific line
    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Lowercased file extension, if any
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
    }

    /// Rough token estimate: ~4 characters per token for code
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        (self.content.len() / 4).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: usize, end: usize) -> CodeChunk {
        CodeChunk::new("src/test.rs".to_string(), start, end, "code".to_string())
    }

    #[test]
    fn test_chunk_line_count() {
        assert_eq!(chunk(10, 15).line_count(), 6);
        assert_eq!(chunk(1, 1).line_count(), 1);
    }

    #[test]
    fn test_chunk_contains_line() {
        let chunk = chunk(10, 15);
        assert!(chunk.contains_line(10));
        assert!(chunk.contains_line(12));
        assert!(chunk.contains_line(15));
        assert!(!chunk.contains_line(9));
        assert!(!chunk.contains_line(16));
    }

    #[test]
    fn test_chunk_identity_and_extension() {
        let chunk = chunk(3, 7);
        assert_eq!(chunk.id(), "src/test.rs:3:7");
        assert_eq!(chunk.extension().as_deref(), Some("rs"));

        let bare = CodeChunk::new("Makefile".into(), 1, 1, String::new());
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn test_relevance_defaults_when_missing() {
        let json = r#"{"file_path":"a.py","start_line":1,"end_line":2,"content":"x"}"#;
        let chunk: CodeChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.relevance_score, 0.0);
    }
}
