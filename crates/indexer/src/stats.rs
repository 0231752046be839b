use serde::{Deserialize, Serialize};

/// Statistics about one ingestion pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Number of files chunked
    pub files: usize,

    /// Number of chunks created
    pub chunks: usize,

    /// Total lines across chunked files
    pub total_lines: usize,

    /// Files skipped because they were empty or not valid UTF-8
    pub skipped: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Read errors encountered (non-fatal)
    pub errors: Vec<String>,
}

impl IngestStats {
    pub fn add_file(&mut self, lines: usize, chunks: usize) {
        self.files += 1;
        self.total_lines += lines;
        self.chunks += chunks;
    }

    pub fn add_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }
}
