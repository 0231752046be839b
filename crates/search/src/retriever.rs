use crate::error::{Result, SearchError};
use crate::fusion::RRFFusion;
use crate::lexical::LexicalScorer;
use mender_code_chunker::CodeChunk;
use mender_vector_store::VectorStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How candidate chunks are ranked against a defect description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Keyword scorer only
    #[default]
    Lexical,
    /// Nearest neighbors in embedding space
    Semantic,
    /// Reciprocal-rank fusion of both rankings
    Hybrid,
}

impl RetrievalMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    #[must_use]
    pub const fn needs_vectors(self) -> bool {
        !matches!(self, Self::Lexical)
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(SearchError::UnknownMode(other.to_string())),
        }
    }
}

/// Top-K chunk retrieval over one repository snapshot
pub struct Retriever {
    mode: RetrievalMode,
    scorer: LexicalScorer,
    fusion: RRFFusion,
    chunks: Vec<CodeChunk>,
    store: Option<VectorStore>,
}

impl Retriever {
    /// Lexical-only retriever; needs no embeddings
    #[must_use]
    pub fn lexical(scorer: LexicalScorer, chunks: Vec<CodeChunk>) -> Self {
        Self {
            mode: RetrievalMode::Lexical,
            scorer,
            fusion: RRFFusion::default(),
            chunks,
            store: None,
        }
    }

    /// Build a retriever for `mode`, embedding `chunks` into `store` when the
    /// mode ranks by vectors. The store must be empty.
    pub async fn build(
        mode: RetrievalMode,
        scorer: LexicalScorer,
        chunks: Vec<CodeChunk>,
        store: Option<VectorStore>,
    ) -> Result<Self> {
        let store = if mode.needs_vectors() {
            let mut store = store.ok_or(SearchError::MissingVectorStore(mode.as_str()))?;
            if !store.is_empty() {
                return Err(SearchError::StoreNotEmpty(store.len()));
            }
            store.ingest(chunks.clone()).await?;
            Some(store)
        } else {
            None
        };

        log::info!("Retriever ready: mode={}, chunks={}", mode, chunks.len());
        Ok(Self {
            mode,
            scorer,
            fusion: RRFFusion::default(),
            chunks,
            store,
        })
    }

    #[must_use]
    pub fn with_fusion(mut self, fusion: RRFFusion) -> Self {
        self.fusion = fusion;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> RetrievalMode {
        self.mode
    }

    #[must_use]
    pub fn chunks(&self) -> &[CodeChunk] {
        &self.chunks
    }

    /// The `top_k` most relevant chunks for `query`, best first, each
    /// truncated to the scorer's character budget.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<CodeChunk>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let results = match self.mode {
            RetrievalMode::Lexical => self.scorer.select(self.chunks.clone(), query, top_k),
            RetrievalMode::Semantic => self.semantic(query, top_k).await?,
            RetrievalMode::Hybrid => self.hybrid(query, top_k).await?,
        };

        log::debug!(
            "Retrieved {} chunks (mode={}, top_k={})",
            results.len(),
            self.mode,
            top_k
        );
        Ok(results)
    }

    fn vector_store(&self) -> Result<&VectorStore> {
        self.store
            .as_ref()
            .ok_or(SearchError::MissingVectorStore(self.mode.as_str()))
    }

    async fn semantic(&self, query: &str, top_k: usize) -> Result<Vec<CodeChunk>> {
        let hits = self.vector_store()?.query(query, top_k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut chunk = hit.chunk;
                chunk.relevance_score = hit.score.clamp(0.0, 1.0);
                self.scorer.truncate(chunk)
            })
            .collect())
    }

    async fn hybrid(&self, query: &str, top_k: usize) -> Result<Vec<CodeChunk>> {
        // Candidate pool size (retrieve more for fusion)
        let candidate_pool = top_k.saturating_mul(5);

        let mut scored = self.chunks.clone();
        let mut lexical = self.scorer.rank(&mut scored, query);
        lexical.truncate(candidate_pool);

        // Store positions equal chunk positions: the store was filled from `chunks`
        let semantic: Vec<usize> = self
            .vector_store()?
            .query(query, candidate_pool)
            .await?
            .into_iter()
            .map(|hit| hit.idx)
            .collect();

        let fused = self.fusion.fuse(&lexical, &semantic);
        Ok(fused
            .into_iter()
            .take(top_k)
            .filter_map(|(idx, score)| {
                scored.get(idx).map(|chunk| {
                    let mut chunk = chunk.clone();
                    chunk.relevance_score = score;
                    self.scorer.truncate(chunk)
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mender_vector_store::{EmbeddingModel, IndexKind};
    use pretty_assertions::assert_eq;

    fn corpus() -> Vec<CodeChunk> {
        vec![
            CodeChunk::new("src/cache.rs".into(), 1, 3, "fn evict() {}\nfn insert() {}".into()),
            CodeChunk::new("src/session.rs".into(), 1, 2, "fn session_timeout() {}".into()),
            CodeChunk::new("README.md".into(), 1, 1, "project readme".into()),
        ]
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Hybrid".parse::<RetrievalMode>().unwrap(), RetrievalMode::Hybrid);
        assert_eq!(" lexical ".parse::<RetrievalMode>().unwrap(), RetrievalMode::Lexical);
        assert!("fuzzy".parse::<RetrievalMode>().is_err());
        assert_eq!(RetrievalMode::default(), RetrievalMode::Lexical);
    }

    #[tokio::test]
    async fn lexical_retrieval() {
        let retriever = Retriever::lexical(LexicalScorer::default(), corpus());
        let top = retriever.retrieve("session timeout", 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].file_path, "src/session.rs");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let retriever = Retriever::lexical(LexicalScorer::default(), corpus());
        assert!(matches!(
            retriever.retrieve("   ", 3).await,
            Err(SearchError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn vector_modes_need_a_store() {
        let result = Retriever::build(RetrievalMode::Semantic, LexicalScorer::default(), corpus(), None).await;
        assert!(matches!(result, Err(SearchError::MissingVectorStore("semantic"))));
    }

    #[tokio::test]
    async fn semantic_exact_text_ranks_first() {
        let store = VectorStore::new(EmbeddingModel::fallback(), IndexKind::Flat);
        let retriever = Retriever::build(
            RetrievalMode::Semantic,
            LexicalScorer::default(),
            corpus(),
            Some(store),
        )
        .await
        .unwrap();

        let top = retriever.retrieve("project readme", 3).await.unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].file_path, "README.md");
        assert!((top[0].relevance_score - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn hybrid_is_deterministic_and_bounded() {
        let store = VectorStore::new(EmbeddingModel::fallback(), IndexKind::BruteForce);
        let retriever = Retriever::build(
            RetrievalMode::Hybrid,
            LexicalScorer::default(),
            corpus(),
            Some(store),
        )
        .await
        .unwrap()
        .with_fusion(RRFFusion::new(0.9, 0.1, 60.0));

        let first = retriever.retrieve("cache evict", 2).await.unwrap();
        let second = retriever.retrieve("cache evict", 2).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].file_path, "src/cache.rs");
    }
}
