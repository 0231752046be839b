use crate::error::Result;
use mender_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CHUNKS_FILE: &str = "chunks.json";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const RESPONSE_FILE: &str = "response.json";
pub const RESULT_FILE: &str = "result.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkArtifact {
    pub file: String,
    /// `start-end`, 1-based inclusive
    pub lines: String,
    pub score: f32,
    pub content: String,
}

impl From<&CodeChunk> for ChunkArtifact {
    fn from(chunk: &CodeChunk) -> Self {
        Self {
            file: chunk.file_path.clone(),
            lines: format!("{}-{}", chunk.start_line, chunk.end_line),
            score: chunk.relevance_score,
            content: chunk.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseArtifact {
    pub model: String,
    pub attempt_index: usize,
    pub timestamp_unix_ms: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub response_text: String,
}

/// Inspection files for one run under `<runs_dir>/<run_id>/`.
///
/// Nothing here is read back by the engine.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    dir: PathBuf,
}

impl RunArtifacts {
    pub async fn create(runs_dir: impl AsRef<Path>, run_id: &str) -> Result<Self> {
        let dir = runs_dir.as_ref().join(run_id);
        tokio::fs::create_dir_all(&dir).await?;
        log::debug!("Run artifacts in {}", dir.display());
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn patch_path(&self, attempt_index: usize) -> PathBuf {
        self.dir.join(format!("attempt-{attempt_index}.patch"))
    }

    pub async fn write_chunks(&self, chunks: &[CodeChunk]) -> Result<()> {
        let entries: Vec<ChunkArtifact> = chunks.iter().map(ChunkArtifact::from).collect();
        self.write_json(CHUNKS_FILE, &entries).await
    }

    /// Overwrites the previous attempt's prompt
    pub async fn write_prompt(&self, prompt: &str) -> Result<()> {
        tokio::fs::write(self.dir.join(PROMPT_FILE), prompt).await?;
        Ok(())
    }

    /// Overwrites the previous attempt's response
    pub async fn write_response(&self, response: &ResponseArtifact) -> Result<()> {
        self.write_json(RESPONSE_FILE, response).await
    }

    pub async fn write_patch(&self, attempt_index: usize, patch: &str) -> Result<PathBuf> {
        let path = self.patch_path(attempt_index);
        tokio::fs::write(&path, patch).await?;
        Ok(path)
    }

    pub async fn write_result(&self, result: &impl Serialize) -> Result<()> {
        self.write_json(RESULT_FILE, result).await
    }

    async fn write_json(&self, name: &str, value: &impl Serialize) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(self.dir.join(name), json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_files_under_run_dir() {
        let temp = TempDir::new().unwrap();
        let artifacts = RunArtifacts::create(temp.path(), "run-7").await.unwrap();
        assert_eq!(artifacts.dir(), temp.path().join("run-7"));

        let mut chunk = CodeChunk::new("src/a.rs".into(), 3, 9, "fn a() {}".into());
        chunk.relevance_score = 0.5;
        artifacts.write_chunks(&[chunk]).await.unwrap();
        artifacts.write_prompt("first").await.unwrap();
        artifacts.write_prompt("second").await.unwrap();
        let patch = artifacts.write_patch(1, "--- a\n+++ b").await.unwrap();

        let chunks: Vec<ChunkArtifact> = serde_json::from_str(
            &tokio::fs::read_to_string(artifacts.dir().join(CHUNKS_FILE)).await.unwrap(),
        )
        .unwrap();
        assert_eq!(chunks[0].lines, "3-9");
        assert_eq!(chunks[0].score, 0.5);

        let prompt = tokio::fs::read_to_string(artifacts.dir().join(PROMPT_FILE)).await.unwrap();
        assert_eq!(prompt, "second");
        assert_eq!(patch.file_name().unwrap(), "attempt-1.patch");
        assert_eq!(tokio::fs::read_to_string(&patch).await.unwrap(), "--- a\n+++ b");
    }
}
