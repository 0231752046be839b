use crate::artifacts::RunArtifacts;
use crate::config::EngineConfig;
use crate::error::{RepairError, Result};
use crate::generation::{GeminiGenerator, GenerationService};
use crate::metrics::RunMetrics;
use crate::persistence::{current_unix_ms, JsonlRecorder, PatchRecord, RunRecord, RunRecorder, RunStatus};
use crate::prompt::PromptBuilder;
use crate::rate_limiter::RateLimiter;
use crate::repair_loop::{LoopOutcome, LoopState, RepairAttempt, RepairLoop, RepairTask};
use crate::validation::{ScriptValidator, ValidationService, Verdict};
use mender_code_chunker::CodeChunk;
use mender_confidence::{Complexity, ConfidenceInput, ConfidenceResult, ConfidenceScorer};
use mender_indexer::RepositoryIngestor;
use mender_search::{LexicalScorer, Retriever};
use mender_vector_store::{EmbeddingModel, VectorStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Triage score assumed when the caller supplies none
pub const DEFAULT_TRIAGE_SCORE: u32 = 5;

/// One defect to repair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub run_id: String,
    pub description: String,
    pub repo_dir: PathBuf,
    /// 1-10, higher means the defect is better understood
    pub triage_score: u32,
    pub complexity: Complexity,
}

impl RepairRequest {
    pub fn new(run_id: impl Into<String>, description: impl Into<String>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            description: description.into(),
            repo_dir: repo_dir.into(),
            triage_score: DEFAULT_TRIAGE_SCORE,
            complexity: Complexity::Unknown,
        }
    }

    #[must_use]
    pub fn with_triage_score(mut self, triage_score: u32) -> Self {
        self.triage_score = triage_score;
        self
    }

    #[must_use]
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    fn check(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(RepairError::config("defect description must not be empty"));
        }
        let id = self.run_id.trim();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(RepairError::config(format!(
                "run id {:?} must be a non-empty single path component",
                self.run_id
            )));
        }
        Ok(())
    }
}

/// Everything a caller learns about a finished run; also written to
/// `result.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub reason: Option<String>,
    pub transitions: Vec<LoopState>,
    pub attempts: Vec<RepairAttempt>,
    /// Patch of the last validated attempt
    pub final_patch: Option<String>,
    pub chunks_selected: usize,
    pub confidence: ConfidenceResult,
    pub recommendation: String,
    pub metrics: RunMetrics,
    pub artifacts_dir: PathBuf,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// Retrieval, the repair loop, scoring and bookkeeping for one defect at a
/// time. Services are shared, so one engine can serve concurrent runs under
/// a single rate limiter.
pub struct RepairEngine {
    config: EngineConfig,
    generator: Arc<dyn GenerationService>,
    validator: Arc<dyn ValidationService>,
    recorder: Arc<dyn RunRecorder>,
    limiter: Arc<RateLimiter>,
    prompts: PromptBuilder,
    confidence: ConfidenceScorer,
    embedder: Option<EmbeddingModel>,
}

impl RepairEngine {
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn GenerationService>,
        validator: Arc<dyn ValidationService>,
        recorder: Arc<dyn RunRecorder>,
    ) -> Result<Self> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        // Loaded once; every retrieval shares the same model
        let embedder = if config.retrieval.mode.needs_vectors() {
            Some(EmbeddingModel::from_env()?)
        } else {
            None
        };
        Ok(Self {
            config,
            generator,
            validator,
            recorder,
            limiter,
            prompts: PromptBuilder::default(),
            confidence: ConfidenceScorer::default(),
            embedder,
        })
    }

    /// Gemini generation, script validation and JSONL records under
    /// `runs_dir`, all taken from `config`
    pub async fn from_config(config: EngineConfig) -> Result<Self> {
        let generator = GeminiGenerator::from_env(&config.generation)?;
        let validator = ScriptValidator::new(&config.validation.script, &config.runs_dir);
        let recorder = JsonlRecorder::new(&config.runs_dir);
        let template = config.generation.prompt_template.clone();

        let mut engine = Self::new(config, Arc::new(generator), Arc::new(validator), Arc::new(recorder))?;
        if let Some(path) = template {
            engine.prompts = PromptBuilder::from_file(path).await?;
        }
        Ok(engine)
    }

    /// Share a limiter with other engines that spend the same quota
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_confidence_scorer(mut self, confidence: ConfidenceScorer) -> Self {
        self.confidence = confidence;
        self
    }

    /// Replace the embedding model used by semantic and hybrid retrieval
    #[must_use]
    pub fn with_embedder(mut self, embedder: EmbeddingModel) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Retrieval, then the repair loop
    pub async fn run(&self, request: RepairRequest) -> Result<RunReport> {
        request.check()?;
        let chunks = self.retrieve(&request).await?;
        self.repair(request, chunks).await
    }

    /// Ingest `repo_dir` and select the chunks most relevant to the
    /// description
    pub async fn retrieve(&self, request: &RepairRequest) -> Result<Vec<CodeChunk>> {
        let retrieval = &self.config.retrieval;
        let ingestor = RepositoryIngestor::new(&request.repo_dir, self.config.chunking.clone())?;
        let (chunks, stats) = ingestor.ingest().await?;
        log::info!(
            "Ingested {}: {} files, {} chunks ({} skipped)",
            request.repo_dir.display(),
            stats.files,
            stats.chunks,
            stats.skipped
        );

        let store = match &self.embedder {
            Some(embedder) if retrieval.mode.needs_vectors() => {
                Some(VectorStore::new(embedder.clone(), retrieval.index))
            }
            _ => None,
        };
        let scorer = LexicalScorer::new(retrieval.max_chars_per_chunk);
        let retriever = Retriever::build(retrieval.mode, scorer, chunks, store).await?;

        Ok(retriever.retrieve(&request.description, retrieval.top_k).await?)
    }

    /// Run the repair loop over already selected chunks.
    ///
    /// Only request and configuration problems are errors; a run that ends
    /// without a passing patch is an `Ok` report with `Exhausted` status.
    pub async fn repair(&self, request: RepairRequest, chunks: Vec<CodeChunk>) -> Result<RunReport> {
        request.check()?;
        let started = Instant::now();

        let artifacts = RunArtifacts::create(&self.config.runs_dir, &request.run_id).await?;
        if let Err(e) = artifacts.write_chunks(&chunks).await {
            log::warn!("Could not save selected chunks: {e}");
        }
        log::info!(
            "Run {}: {} chunks selected, up to {} retries",
            request.run_id,
            chunks.len(),
            self.config.repair.max_retries
        );

        let task = RepairTask {
            run_id: &request.run_id,
            description: &request.description,
            repo_dir: &request.repo_dir,
            chunks: &chunks,
        };
        let repair_loop = RepairLoop::new(
            self.generator.as_ref(),
            self.validator.as_ref(),
            &self.limiter,
            &self.prompts,
            &artifacts,
            &self.config.repair,
        );
        let mut outcome = repair_loop.run(&task).await;
        outcome.metrics.finish(started.elapsed());

        let report = self.report(&request, chunks.len(), outcome, &artifacts);
        log::info!(
            "Run {}: {:?}, confidence {} ({} risk), {}",
            report.run_id,
            report.status,
            report.confidence.score,
            report.confidence.risk,
            report.recommendation
        );

        if let Err(e) = artifacts.write_result(&report).await {
            log::warn!("Could not save run result: {e}");
        }
        self.persist(&report).await;

        Ok(report)
    }

    fn report(&self, request: &RepairRequest, chunks_selected: usize, outcome: LoopOutcome, artifacts: &RunArtifacts) -> RunReport {
        let final_patch = outcome.final_attempt().map(|attempt| attempt.patch_text.clone());
        let confidence = self.confidence.score(&ConfidenceInput {
            patch_generated: final_patch.is_some(),
            triage_score: request.triage_score,
            complexity: request.complexity,
            validation_passed: outcome.passed(),
            repair_attempts: outcome.metrics.generation_calls.saturating_sub(1),
        });
        let status = if outcome.passed() {
            RunStatus::Passed
        } else {
            RunStatus::Exhausted
        };

        RunReport {
            run_id: request.run_id.clone(),
            status,
            reason: outcome.reason.as_ref().map(ToString::to_string),
            transitions: outcome.transitions,
            attempts: outcome.attempts,
            final_patch,
            chunks_selected,
            recommendation: confidence.recommendation().to_string(),
            confidence,
            metrics: outcome.metrics,
            artifacts_dir: artifacts.dir().to_path_buf(),
        }
    }

    /// Records are best effort; a failed write never changes the outcome
    async fn persist(&self, report: &RunReport) {
        for attempt in report.attempts.iter().filter(|a| a.validation_verdict.is_some()) {
            let record = PatchRecord {
                run_id: report.run_id.clone(),
                attempt_index: attempt.attempt_index,
                diff_content: attempt.patch_text.clone(),
                validation_passed: attempt.validation_verdict == Some(Verdict::Pass),
                looks_like_diff: attempt.looks_like_diff,
                recorded_unix_ms: current_unix_ms(),
            };
            if let Err(e) = self.recorder.record_patch(&record).await {
                log::warn!("Could not record patch for run {}: {e}", report.run_id);
            }
        }

        let record = RunRecord {
            run_id: report.run_id.clone(),
            status: report.status,
            reason: report.reason.clone(),
            prompt_tokens: report.metrics.prompt_tokens,
            completion_tokens: report.metrics.completion_tokens,
            chunks_selected: report.chunks_selected,
            attempts: report.attempts.len(),
            confidence_score: report.confidence.score,
            artifacts_path: report.artifacts_dir.clone(),
            recorded_unix_ms: current_unix_ms(),
        };
        if let Err(e) = self.recorder.record_run(&record).await {
            log::warn!("Could not record run {}: {e}", report.run_id);
        }
    }
}
