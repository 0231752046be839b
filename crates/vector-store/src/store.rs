use crate::embeddings::EmbeddingModel;
use crate::error::{Result, VectorStoreError};
use crate::index::{build_index, IndexKind, NearestNeighborIndex};
use crate::types::{SearchResult, StoredChunk};
use mender_code_chunker::CodeChunk;
use std::path::Path;

/// Embedded chunks plus the nearest-neighbor index over them
pub struct VectorStore {
    chunks: Vec<StoredChunk>,
    index: Box<dyn NearestNeighborIndex>,
    embedder: EmbeddingModel,
}

impl VectorStore {
    #[must_use]
    pub fn new(embedder: EmbeddingModel, kind: IndexKind) -> Self {
        let index = build_index(kind, embedder.dimension());
        log::debug!(
            "VectorStore using {} embeddings with {:?} index",
            embedder.backend_name(),
            kind
        );
        Self {
            chunks: Vec::new(),
            index,
            embedder,
        }
    }

    #[must_use]
    pub fn embedder(&self) -> &EmbeddingModel {
        &self.embedder
    }

    #[must_use]
    pub fn index_kind(&self) -> IndexKind {
        self.index.kind()
    }

    /// Embed every chunk's content in one batch and add it to the index
    pub async fn ingest(&mut self, chunks: Vec<CodeChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        log::info!("Embedding {} chunks", chunks.len());

        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_batch(contents).await?;
        if vectors.len() != chunks.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "embedded {} of {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            self.index.add(&vector)?;
            self.chunks.push(StoredChunk { chunk, vector });
        }

        log::info!("Index holds {} chunks", self.chunks.len());
        Ok(())
    }

    /// The `k` chunks most similar to `text`, best first
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        log::debug!("Vector query '{}' (k: {})", text, k);

        let query_vector = self.embedder.embed(text).await?;
        let neighbors = self.index.search(&query_vector, k)?;

        let results: Vec<SearchResult> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                self.chunks.get(neighbor.idx).map(|stored| SearchResult {
                    chunk: stored.chunk.clone(),
                    score: neighbor.score,
                    idx: neighbor.idx,
                })
            })
            .collect();

        log::debug!("Found {} results", results.len());
        Ok(results)
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&StoredChunk> {
        self.chunks.get(idx)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Save chunks and vectors to disk
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::info!("Saving VectorStore to {}", path.display());
        let data = serde_json::to_string(&self.chunks)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Load stored vectors and rebuild the index without re-embedding
    pub async fn load(path: impl AsRef<Path>, embedder: EmbeddingModel, kind: IndexKind) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading VectorStore from {}", path.display());
        let data = tokio::fs::read_to_string(path).await?;
        let chunks: Vec<StoredChunk> = serde_json::from_str(&data)?;

        let mut store = Self::new(embedder, kind);
        for stored in &chunks {
            store.index.add(&stored.vector)?;
        }
        store.chunks = chunks;

        log::info!("Loaded {} chunks", store.chunks.len());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn chunk(path: &str, content: &str, line: usize) -> CodeChunk {
        CodeChunk::new(path.to_string(), line, line + 9, content.to_string())
    }

    fn sample_chunks() -> Vec<CodeChunk> {
        vec![
            chunk("src/auth.rs", "fn refresh_session(token: &str) {}", 1),
            chunk("src/auth.rs", "fn revoke_session(token: &str) {}", 10),
            chunk("src/db.rs", "fn open_pool(url: &str) {}", 1),
        ]
    }

    #[tokio::test]
    async fn test_ingest_and_query_exact_text() {
        let mut store = VectorStore::new(EmbeddingModel::fallback(), IndexKind::Flat);
        store.ingest(sample_chunks()).await.unwrap();
        assert_eq!(store.len(), 3);

        let results = store.query("fn open_pool(url: &str) {}", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.file_path, "src/db.rs");
        assert_eq!(results[0].idx, 2);
        assert!((results[0].score - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_query_is_deterministic_across_index_kinds() {
        let mut flat = VectorStore::new(EmbeddingModel::fallback(), IndexKind::Flat);
        let mut brute = VectorStore::new(EmbeddingModel::fallback(), IndexKind::BruteForce);
        flat.ingest(sample_chunks()).await.unwrap();
        brute.ingest(sample_chunks()).await.unwrap();

        let a: Vec<usize> = flat.query("session bug", 3).await.unwrap().iter().map(|r| r.idx).collect();
        let b: Vec<usize> = brute.query("session bug", 3).await.unwrap().iter().map(|r| r.idx).collect();
        let again: Vec<usize> = flat.query("session bug", 3).await.unwrap().iter().map(|r| r.idx).collect();
        assert_eq!(a, b);
        assert_eq!(a, again);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = VectorStore::new(EmbeddingModel::fallback(), IndexKind::BruteForce);
        assert!(store.is_empty());
        assert!(store.query("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index").join("vectors.json");

        let mut store = VectorStore::new(EmbeddingModel::fallback(), IndexKind::Flat);
        store.ingest(sample_chunks()).await.unwrap();
        store.save(&path).await.unwrap();

        let loaded = VectorStore::load(&path, EmbeddingModel::fallback(), IndexKind::BruteForce)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.index_kind(), IndexKind::BruteForce);

        let before: Vec<usize> = store.query("revoke", 3).await.unwrap().iter().map(|r| r.idx).collect();
        let after: Vec<usize> = loaded.query("revoke", 3).await.unwrap().iter().map(|r| r.idx).collect();
        assert_eq!(before, after);
    }
}
