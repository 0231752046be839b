use crate::error::{RepairError, Result};
use mender_code_chunker::ChunkerConfig;
use mender_search::{RetrievalMode, DEFAULT_MAX_CHARS_PER_CHUNK};
use mender_vector_store::IndexKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine settings, read from TOML. Every field has a default.
///
/// ```toml
/// runs_dir = "data/runs"
///
/// [retrieval]
/// mode = "hybrid"
/// top_k = 8
///
/// [repair]
/// max_retries = 2
/// raw_response_policy = "treat_as_failure"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunking: ChunkerConfig,
    pub retrieval: RetrievalConfig,
    pub repair: RepairSettings,
    pub rate_limit: RateLimitConfig,
    pub generation: GenerationConfig,
    pub validation: ValidationConfig,

    /// Per-run artifact directories and the JSONL run log live here
    pub runs_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkerConfig::default(),
            retrieval: RetrievalConfig::default(),
            repair: RepairSettings::default(),
            rate_limit: RateLimitConfig::default(),
            generation: GenerationConfig::default(),
            validation: ValidationConfig::default(),
            runs_dir: PathBuf::from("data/runs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub max_chars_per_chunk: usize,
    /// Index variant for semantic and hybrid modes
    pub index: IndexKind,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Lexical,
            top_k: 10,
            max_chars_per_chunk: DEFAULT_MAX_CHARS_PER_CHUNK,
            index: IndexKind::Flat,
        }
    }
}

/// What to do with a model response that holds no parsable JSON object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawResponsePolicy {
    /// Use the raw text as the patch body and validate it
    #[default]
    AcceptAsPatch,
    /// Count the attempt as failed without validating
    TreatAsFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairSettings {
    /// Repairs allowed after the first attempt
    pub max_retries: u32,
    /// Only the last N characters of a failure log are fed back
    pub failure_log_tail_chars: usize,
    pub raw_response_policy: RawResponsePolicy,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            max_retries: 1,
            failure_log_tail_chars: 2000,
            raw_response_policy: RawResponsePolicy::AcceptAsPatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub tokens_per_minute: u64,
    pub safety_margin_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: 900_000,
            safety_margin_secs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    /// Replaces the built-in prompt template
    pub prompt_template: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            temperature: 0.0,
            max_output_tokens: 8192,
            timeout_secs: 120,
            prompt_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Invoked as `<script> --run-id .. --task-id .. --repo-dir .. --patch ..`
    pub script: PathBuf,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("scripts/validate_patch.sh"),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            RepairError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        log::debug!("Loaded engine config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate().map_err(RepairError::Config)?;

        if self.retrieval.top_k == 0 {
            return Err(RepairError::config("retrieval.top_k must be > 0"));
        }
        if self.retrieval.max_chars_per_chunk == 0 {
            return Err(RepairError::config(
                "retrieval.max_chars_per_chunk must be > 0",
            ));
        }
        if self.repair.failure_log_tail_chars == 0 {
            return Err(RepairError::config(
                "repair.failure_log_tail_chars must be > 0",
            ));
        }
        if self.rate_limit.tokens_per_minute == 0 {
            return Err(RepairError::config(
                "rate_limit.tokens_per_minute must be > 0",
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RepairError::config(format!(
                "generation.temperature ({}) must be within 0.0..=2.0",
                self.generation.temperature
            )));
        }
        if self.generation.model.trim().is_empty() {
            return Err(RepairError::config("generation.model must not be empty"));
        }

        Ok(())
    }
}
