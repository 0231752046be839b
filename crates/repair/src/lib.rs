//! # Mender Repair
//!
//! Turns a defect description and a repository checkout into a validated
//! patch, or a recorded failure.
//!
//! ## Pipeline
//!
//! ```text
//! RepairRequest
//!     │
//!     ├──> Retrieval (ingest → Retriever::retrieve, top-K chunks)
//!     │
//!     ├──> RepairLoop
//!     │      ├─> PromptBuilder (description, chunks, previous patch, log tail)
//!     │      ├─> RateLimiter::admit (60 s sliding token window)
//!     │      ├─> GenerationService (Gemini)
//!     │      ├─> parse_response (JSON, raw fallback, refusal token)
//!     │      └─> ValidationService (external script) → pass | fail
//!     │
//!     ├──> ConfidenceScorer → score, risk, recommendation
//!     │
//!     └──> RunArtifacts + RunRecorder (result.json, runs.jsonl, patches.jsonl)
//! ```
//!
//! Generation, validation and persistence sit behind traits so the loop can
//! be driven by scripted services in tests.
//!
//! ## Example
//!
//! ```no_run
//! use mender_repair::{EngineConfig, RepairEngine, RepairRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::load("mender.toml").await?;
//!     let engine = RepairEngine::from_config(config).await?;
//!
//!     let request = RepairRequest::new("run-42", "Login fails when the session expires", "/src/app")
//!         .with_triage_score(7);
//!     let report = engine.run(request).await?;
//!
//!     println!("{:?}: {}", report.status, report.recommendation);
//!     Ok(())
//! }
//! ```

mod artifacts;
mod config;
mod engine;
mod error;
mod generation;
mod metrics;
mod parse;
mod persistence;
mod prompt;
mod rate_limiter;
mod repair_loop;
mod validation;

pub use artifacts::{
    ChunkArtifact, ResponseArtifact, RunArtifacts, CHUNKS_FILE, PROMPT_FILE, RESPONSE_FILE,
    RESULT_FILE,
};
pub use config::{
    EngineConfig, GenerationConfig, RateLimitConfig, RawResponsePolicy, RepairSettings,
    RetrievalConfig, ValidationConfig,
};
pub use engine::{RepairEngine, RepairRequest, RunReport, DEFAULT_TRIAGE_SCORE};
pub use error::{RepairError, Result};
pub use generation::{GeminiGenerator, GenerationResponse, GenerationService, API_KEY_ENV};
pub use metrics::{RunMetrics, TokenUsage};
pub use parse::{looks_like_diff, parse_response, ParsedResponse, PatchProposal, REFUSAL_TOKEN};
pub use persistence::{
    JsonlRecorder, MemoryRecorder, PatchRecord, RunRecord, RunRecorder, RunStatus, PATCHES_LOG,
    RUNS_LOG,
};
pub use prompt::{estimate_tokens, format_chunks, tail_chars, PromptBuilder, PromptContext};
pub use rate_limiter::{Admission, RateLimiter, RateWindow, WINDOW};
pub use repair_loop::{
    ExhaustReason, LoopOutcome, LoopState, RepairAttempt, RepairLoop, RepairTask,
};
pub use validation::{
    ScriptValidator, ValidationOutcome, ValidationRequest, ValidationService, Verdict,
    VALIDATION_RESULT_FILE,
};

// Re-exported so callers can build requests without extra dependencies
pub use mender_code_chunker::CodeChunk;
pub use mender_confidence::{Complexity, ConfidenceResult, RiskRating};
pub use mender_search::RetrievalMode;
pub use mender_vector_store::EmbeddingModel;
