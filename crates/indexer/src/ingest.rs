use crate::error::{IndexerError, Result};
use crate::scanner::FileScanner;
use crate::stats::IngestStats;
use mender_code_chunker::{Chunker, ChunkerConfig, ChunkerError, CodeChunk};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Reads every decodable file under a repository root and chunks it
pub struct RepositoryIngestor {
    root: PathBuf,
    chunker: Chunker,
}

impl RepositoryIngestor {
    pub fn new(root: impl AsRef<Path>, config: ChunkerConfig) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(IndexerError::InvalidPath(root.display().to_string()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            chunker: Chunker::new(config)?,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan, decode and chunk the repository.
    ///
    /// Binary, undecodable and empty files are skipped; unreadable files are
    /// recorded in the stats and skipped. Chunk paths are relative to the root
    /// with `/` separators, in scan order.
    pub async fn ingest(&self) -> Result<(Vec<CodeChunk>, IngestStats)> {
        let start = Instant::now();
        let mut stats = IngestStats::default();
        let mut chunks = Vec::new();

        for path in FileScanner::new(&self.root).scan() {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Failed to read {}: {e}", path.display());
                    stats.add_error(format!("{}: {e}", path.display()));
                    continue;
                }
            };

            let Ok(content) = String::from_utf8(bytes) else {
                log::debug!("Skipping non-UTF-8 file {}", path.display());
                stats.add_skipped();
                continue;
            };

            let relative = self.relative_path(&path);
            match self.chunker.chunk_str(&content, &relative) {
                Ok(file_chunks) => {
                    stats.add_file(content.lines().count(), file_chunks.len());
                    chunks.extend(file_chunks);
                }
                Err(ChunkerError::EmptyContent) => stats.add_skipped(),
                Err(e) => return Err(e.into()),
            }
        }

        stats.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Ingested {} files into {} chunks ({} skipped) in {}ms",
            stats.files,
            stats.chunks,
            stats.skipped,
            stats.time_ms
        );
        Ok((chunks, stats))
    }

    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
