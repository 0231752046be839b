use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(feature = "local-model")]
use tokio::task::spawn_blocking;

/// Dimension shared by the fallback embedder and all-MiniLM-L6-v2
pub const EMBEDDING_DIMENSION: usize = 384;

/// Fixed-dimension embedding of one chunk or query. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    #[must_use]
    pub fn norm(&self) -> f32 {
        self.dot(self).sqrt()
    }

    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.dimension() != other.dimension() {
            return 0.0;
        }
        let norms = self.norm() * other.norm();
        if norms == 0.0 {
            return 0.0;
        }
        self.dot(other) / norms
    }
}

/// Which embedding backend to construct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Local model when it loads, deterministic fallback otherwise
    Auto,
    /// Local model or error
    Local,
    /// Deterministic fallback only
    Stub,
}

impl EmbeddingMode {
    /// Reads `MENDER_EMBEDDING_MODE` (`auto` | `local` | `stub`, default `auto`)
    pub fn from_env() -> Result<Self> {
        let raw = env::var("MENDER_EMBEDDING_MODE")
            .unwrap_or_else(|_| "auto".to_string())
            .to_ascii_lowercase();
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "auto" | "" => Ok(Self::Auto),
            "local" => Ok(Self::Local),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported MENDER_EMBEDDING_MODE '{other}' (expected 'auto', 'local' or 'stub')"
            ))),
        }
    }
}

#[cfg(feature = "local-model")]
struct LocalBackend {
    model: fastembed::TextEmbedding,
}

#[cfg(feature = "local-model")]
impl LocalBackend {
    fn load() -> Result<Self> {
        let options =
            fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("{e:#}")))?;
        Ok(Self { model })
    }

    fn embed_batch_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.model
            .embed(texts, None)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("{e:#}")))
    }
}

#[derive(Clone)]
enum EmbeddingBackend {
    #[cfg(feature = "local-model")]
    Local(Arc<LocalBackend>),
    Fallback,
}

/// Embedding model for chunk and query text.
///
/// Clones share the loaded model. In `auto` mode a local model that fails at
/// embed time degrades every clone to the deterministic fallback for the rest
/// of the process; vectors embedded before the failure are not recomputed.
#[derive(Clone)]
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    dimension: usize,
    fallback_on_error: bool,
    degraded: Arc<AtomicBool>,
}

impl EmbeddingModel {
    pub fn from_env() -> Result<Self> {
        Self::with_mode(EmbeddingMode::from_env()?)
    }

    /// Deterministic hash-seeded embedder; no model files, no network
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            backend: EmbeddingBackend::Fallback,
            dimension: EMBEDDING_DIMENSION,
            fallback_on_error: false,
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_mode(mode: EmbeddingMode) -> Result<Self> {
        match mode {
            EmbeddingMode::Stub => Ok(Self::fallback()),
            EmbeddingMode::Local => Self::local(false),
            EmbeddingMode::Auto => match Self::local(true) {
                Ok(model) => Ok(model),
                Err(e) => {
                    log::info!("Local embedding model unavailable ({e}); using deterministic fallback");
                    Ok(Self::fallback())
                }
            },
        }
    }

    #[cfg(feature = "local-model")]
    fn local(fallback_on_error: bool) -> Result<Self> {
        let backend = LocalBackend::load()?;
        log::info!("Loaded local embedding model all-MiniLM-L6-v2");
        Ok(Self {
            backend: EmbeddingBackend::Local(Arc::new(backend)),
            dimension: EMBEDDING_DIMENSION,
            fallback_on_error,
            degraded: Arc::new(AtomicBool::new(false)),
        })
    }

    #[cfg(not(feature = "local-model"))]
    fn local(_fallback_on_error: bool) -> Result<Self> {
        Err(VectorStoreError::EmbeddingError(
            "built without the `local-model` feature".to_string(),
        ))
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self.backend, EmbeddingBackend::Fallback) || self.degraded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        if self.degraded.load(Ordering::Relaxed) {
            return "deterministic-fallback";
        }
        match self.backend {
            #[cfg(feature = "local-model")]
            EmbeddingBackend::Local(_) => "all-MiniLM-L6-v2",
            EmbeddingBackend::Fallback => "deterministic-fallback",
        }
    }

    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let mut embeddings = self.embed_batch(vec![text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }

    pub async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let vectors: Vec<Vec<f32>> = match &self.backend {
            EmbeddingBackend::Fallback => self.fallback_vectors(&texts),
            #[cfg(feature = "local-model")]
            EmbeddingBackend::Local(_) if self.degraded.load(Ordering::Relaxed) => {
                self.fallback_vectors(&texts)
            }
            #[cfg(feature = "local-model")]
            EmbeddingBackend::Local(backend) => {
                let backend = backend.clone();
                let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
                let result = spawn_blocking(move || backend.embed_batch_blocking(owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))
                    .and_then(|inner| inner);
                self.recover(result, &texts)?
            }
        };

        for vector in &vectors {
            ensure_dimension(vector, self.dimension)?;
        }
        Ok(vectors.into_iter().map(EmbeddingVector::new).collect())
    }
}

impl EmbeddingModel {
    fn fallback_vectors(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| fallback_embed(text, self.dimension))
            .collect()
    }

    /// Swap a failed local batch for fallback vectors when allowed
    #[cfg_attr(not(feature = "local-model"), allow(dead_code))]
    fn recover(&self, result: Result<Vec<Vec<f32>>>, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        match result {
            Ok(vectors) => Ok(vectors),
            Err(e) if self.fallback_on_error => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    log::warn!("Local embedding model failed ({e}); switching to deterministic fallback");
                }
                Ok(self.fallback_vectors(texts))
            }
            Err(e) => Err(e),
        }
    }
}

fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() == expected {
        Ok(())
    } else {
        Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vec.len(),
        })
    }
}

/// Placeholder embedding: sha256(text) → 32-bit seed → splitmix64 → Box-Muller
/// gaussians → unit length. Same text always gives a bit-identical vector.
#[must_use]
pub fn fallback_embed(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let seed = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

    let mut state = u64::from(seed);
    let mut vec = Vec::with_capacity(dimension);
    while vec.len() < dimension {
        let (a, b) = gaussian_pair(&mut state);
        vec.push(a as f32);
        if vec.len() < dimension {
            vec.push(b as f32);
        }
    }
    normalize(&mut vec);
    vec
}

fn gaussian_pair(state: &mut u64) -> (f64, f64) {
    // (0, 1]: ln(0) is not allowed
    let u1 = 1.0 - unit_f64(splitmix64(state));
    let u2 = unit_f64(splitmix64(state));
    let radius = (-2.0 * u1.ln()).sqrt();
    let theta = std::f64::consts::TAU * u2;
    (radius * theta.cos(), radius * theta.sin())
}

fn unit_f64(bits: u64) -> f64 {
    // 53 high bits → [0, 1)
    (bits >> 11) as f64 / (1u64 << 53) as f64
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}
