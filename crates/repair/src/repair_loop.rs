//! Generate, validate and repair state machine.
//!
//! ```text
//! INIT → GENERATING → VALIDATING ─pass→ PASSED
//!            ↑   │         │
//!            │   │        fail, retries left → REPAIRING ─┐
//!            │   │         │                              │
//!            │   │        fail, none left → EXHAUSTED     │
//!            │   └─declined────────────→ EXHAUSTED        │
//!            └────────────────────────────────────────────┘
//! ```
//!
//! Every failure (unusable response, generation error, failed verdict)
//! consumes one retry, so a run makes at most `max_retries + 1` generation
//! calls and at most `max_retries + 1` validation calls.

use crate::artifacts::{ResponseArtifact, RunArtifacts};
use crate::config::{RawResponsePolicy, RepairSettings};
use crate::generation::GenerationService;
use crate::metrics::{RunMetrics, TokenUsage};
use crate::parse::{looks_like_diff, parse_response, ParsedResponse};
use crate::persistence::current_unix_ms;
use crate::prompt::{estimate_tokens, tail_chars, PromptBuilder, PromptContext};
use crate::rate_limiter::RateLimiter;
use crate::validation::{ValidationOutcome, ValidationRequest, ValidationService, Verdict};
use mender_code_chunker::CodeChunk;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Generating,
    Validating,
    Repairing,
    Passed,
    Exhausted,
}

impl LoopState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Exhausted)
    }
}

/// Why a run ended without a passing patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExhaustReason {
    /// The model emitted the refusal token
    Declined { detail: String },
    /// Every attempt failed and no retries are left
    RetriesExhausted,
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declined { .. } => f.write_str("declined"),
            Self::RetriesExhausted => f.write_str("retries exhausted"),
        }
    }
}

/// One generate-then-validate iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub attempt_index: usize,
    pub patch_text: String,
    pub explanation: String,
    pub estimated_risk: Option<String>,
    /// `None` when the attempt never reached validation
    pub validation_verdict: Option<Verdict>,
    pub token_usage: TokenUsage,
    /// The patch is the raw response, not a parsed JSON field
    pub raw_fallback: bool,
    pub looks_like_diff: bool,
    pub failure_reason: Option<String>,
}

impl RepairAttempt {
    fn unvalidated(attempt_index: usize, token_usage: TokenUsage, failure_reason: String) -> Self {
        Self {
            attempt_index,
            patch_text: String::new(),
            explanation: String::new(),
            estimated_risk: None,
            validation_verdict: None,
            token_usage,
            raw_fallback: false,
            looks_like_diff: false,
            failure_reason: Some(failure_reason),
        }
    }
}

/// Inputs of one run that stay fixed across attempts
#[derive(Debug, Clone, Copy)]
pub struct RepairTask<'a> {
    pub run_id: &'a str,
    pub description: &'a str,
    pub repo_dir: &'a Path,
    pub chunks: &'a [CodeChunk],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    /// `Passed` or `Exhausted`
    pub state: LoopState,
    pub reason: Option<ExhaustReason>,
    pub attempts: Vec<RepairAttempt>,
    /// Every state entered, in order, starting with `Init`
    pub transitions: Vec<LoopState>,
    pub metrics: RunMetrics,
}

impl LoopOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.state == LoopState::Passed
    }

    /// The last attempt that produced a patch and reached validation
    #[must_use]
    pub fn final_attempt(&self) -> Option<&RepairAttempt> {
        self.attempts
            .iter()
            .rev()
            .find(|attempt| attempt.validation_verdict.is_some())
    }
}

/// A patch waiting for validation
struct Candidate {
    attempt_index: usize,
    patch_text: String,
    explanation: String,
    estimated_risk: Option<String>,
    raw_fallback: bool,
    token_usage: TokenUsage,
}

enum Phase {
    Generating,
    Validating(Candidate),
    Repairing,
    Passed,
    Exhausted(ExhaustReason),
}

impl Phase {
    const fn state(&self) -> LoopState {
        match self {
            Self::Generating => LoopState::Generating,
            Self::Validating(_) => LoopState::Validating,
            Self::Repairing => LoopState::Repairing,
            Self::Passed => LoopState::Passed,
            Self::Exhausted(_) => LoopState::Exhausted,
        }
    }
}

enum Generated {
    Candidate(Candidate),
    Declined(String),
    Failed(String),
}

/// Evidence carried into the next prompt
#[derive(Default)]
struct Feedback {
    previous_patch: Option<String>,
    failure_logs: Option<String>,
    validation_results: Option<String>,
}

pub struct RepairLoop<'a> {
    generator: &'a dyn GenerationService,
    validator: &'a dyn ValidationService,
    limiter: &'a RateLimiter,
    prompts: &'a PromptBuilder,
    artifacts: &'a RunArtifacts,
    settings: &'a RepairSettings,
}

impl<'a> RepairLoop<'a> {
    pub fn new(
        generator: &'a dyn GenerationService,
        validator: &'a dyn ValidationService,
        limiter: &'a RateLimiter,
        prompts: &'a PromptBuilder,
        artifacts: &'a RunArtifacts,
        settings: &'a RepairSettings,
    ) -> Self {
        Self {
            generator,
            validator,
            limiter,
            prompts,
            artifacts,
            settings,
        }
    }

    /// Drive the state machine to `Passed` or `Exhausted`. Never fails:
    /// every error inside an attempt becomes a failed verdict.
    pub async fn run(&self, task: &RepairTask<'_>) -> LoopOutcome {
        let mut outcome = LoopOutcome {
            state: LoopState::Init,
            reason: None,
            attempts: Vec::new(),
            transitions: vec![LoopState::Init],
            metrics: RunMetrics::default(),
        };
        let mut feedback = Feedback::default();
        let mut retries_used = 0_u32;
        let mut phase = Phase::Generating;

        loop {
            outcome.transitions.push(phase.state());
            log::debug!("Run {}: {:?}", task.run_id, phase.state());

            phase = match phase {
                Phase::Generating => match self.generate(task, &feedback, &mut outcome).await {
                    Generated::Candidate(candidate) => Phase::Validating(candidate),
                    Generated::Declined(detail) => Phase::Exhausted(ExhaustReason::Declined { detail }),
                    Generated::Failed(why) => {
                        feedback.validation_results = Some(why);
                        self.retry_or_exhaust(&mut retries_used)
                    }
                },
                Phase::Validating(candidate) => {
                    let patch_text = candidate.patch_text.clone();
                    let verdict = self.validate(task, candidate, &mut outcome).await;
                    if verdict.passed() {
                        Phase::Passed
                    } else {
                        let logs = tail_chars(&verdict.failure_logs, self.settings.failure_log_tail_chars);
                        feedback = Feedback {
                            previous_patch: Some(patch_text),
                            failure_logs: (!logs.trim().is_empty()).then(|| logs.to_string()),
                            validation_results: Some(format!("verdict: {}", verdict.verdict)),
                        };
                        self.retry_or_exhaust(&mut retries_used)
                    }
                }
                Phase::Repairing => {
                    log::info!(
                        "Run {}: repairing ({} of {} retries used)",
                        task.run_id,
                        retries_used,
                        self.settings.max_retries
                    );
                    Phase::Generating
                }
                Phase::Passed => {
                    outcome.state = LoopState::Passed;
                    break;
                }
                Phase::Exhausted(reason) => {
                    log::warn!("Run {}: exhausted ({})", task.run_id, reason);
                    outcome.state = LoopState::Exhausted;
                    outcome.reason = Some(reason);
                    break;
                }
            };
        }

        outcome
    }

    fn retry_or_exhaust(&self, retries_used: &mut u32) -> Phase {
        if *retries_used < self.settings.max_retries {
            *retries_used += 1;
            Phase::Repairing
        } else {
            Phase::Exhausted(ExhaustReason::RetriesExhausted)
        }
    }

    async fn generate(&self, task: &RepairTask<'_>, feedback: &Feedback, outcome: &mut LoopOutcome) -> Generated {
        let attempt_index = outcome.attempts.len();
        let prompt = self.prompts.build(&PromptContext {
            description: task.description,
            chunks: task.chunks,
            previous_patch: feedback.previous_patch.as_deref(),
            failure_logs: feedback.failure_logs.as_deref(),
            validation_results: feedback.validation_results.as_deref(),
        });
        if let Err(e) = self.artifacts.write_prompt(&prompt).await {
            log::warn!("Could not save prompt: {e}");
        }

        let estimated = estimate_tokens(&prompt);
        log::info!(
            "Attempt {}: generating with {} (~{} prompt tokens)",
            attempt_index + 1,
            self.generator.model(),
            estimated
        );

        let admission = self.limiter.admit(estimated).await;
        let response = match self.generator.generate(&prompt).await {
            Ok(response) => {
                self.limiter.record(admission, response.total_tokens());
                response
            }
            Err(e) => {
                self.limiter.release(admission);
                outcome.metrics.record_generation(TokenUsage::default());
                let reason = format!("generation failed: {e:#}");
                log::warn!("Attempt {}: {reason}", attempt_index + 1);
                outcome
                    .attempts
                    .push(RepairAttempt::unvalidated(attempt_index, TokenUsage::default(), reason.clone()));
                return Generated::Failed(reason);
            }
        };

        let usage = TokenUsage {
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        };
        outcome.metrics.record_generation(usage);

        let artifact = ResponseArtifact {
            model: self.generator.model().to_string(),
            attempt_index,
            timestamp_unix_ms: current_unix_ms(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            response_text: response.text.clone(),
        };
        if let Err(e) = self.artifacts.write_response(&artifact).await {
            log::warn!("Could not save response: {e}");
        }

        match parse_response(&response.text) {
            ParsedResponse::Parsed(proposal) => {
                log::info!(
                    "Attempt {}: patch proposed (risk: {}) {}",
                    attempt_index + 1,
                    proposal.estimated_risk,
                    proposal.explanation
                );
                Generated::Candidate(Candidate {
                    attempt_index,
                    patch_text: proposal.patch_text,
                    explanation: proposal.explanation,
                    estimated_risk: Some(proposal.estimated_risk),
                    raw_fallback: false,
                    token_usage: usage,
                })
            }
            ParsedResponse::RawFallback { patch_text } => match self.settings.raw_response_policy {
                RawResponsePolicy::AcceptAsPatch => Generated::Candidate(Candidate {
                    attempt_index,
                    patch_text,
                    explanation: String::new(),
                    estimated_risk: None,
                    raw_fallback: true,
                    token_usage: usage,
                }),
                RawResponsePolicy::TreatAsFailure => {
                    let reason = "response was not a JSON patch object".to_string();
                    let mut attempt = RepairAttempt::unvalidated(attempt_index, usage, reason.clone());
                    attempt.looks_like_diff = looks_like_diff(&patch_text);
                    attempt.patch_text = patch_text;
                    attempt.raw_fallback = true;
                    outcome.attempts.push(attempt);
                    Generated::Failed(reason)
                }
            },
            ParsedResponse::Declined { reason } => {
                log::warn!("Attempt {}: model declined: {reason}", attempt_index + 1);
                outcome.attempts.push(RepairAttempt::unvalidated(
                    attempt_index,
                    usage,
                    format!("declined: {reason}"),
                ));
                Generated::Declined(reason)
            }
            ParsedResponse::Empty => {
                let reason = "Empty patch content".to_string();
                log::warn!("Attempt {}: {reason}", attempt_index + 1);
                outcome
                    .attempts
                    .push(RepairAttempt::unvalidated(attempt_index, usage, reason.clone()));
                Generated::Failed(reason)
            }
        }
    }

    async fn validate(&self, task: &RepairTask<'_>, candidate: Candidate, outcome: &mut LoopOutcome) -> ValidationOutcome {
        let diff_like = looks_like_diff(&candidate.patch_text);
        if !diff_like {
            log::warn!(
                "Attempt {}: patch has no ---/+++ headers",
                candidate.attempt_index + 1
            );
        }

        let task_id = format!("attempt-{}", candidate.attempt_index);
        let verdict = match self
            .artifacts
            .write_patch(candidate.attempt_index, &candidate.patch_text)
            .await
        {
            Ok(patch_path) => {
                let request = ValidationRequest {
                    run_id: task.run_id,
                    task_id: &task_id,
                    repo_dir: task.repo_dir,
                    patch_path: &patch_path,
                };
                match self.validator.validate(&request).await {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        log::warn!("Validation error, counting as fail: {e:#}");
                        ValidationOutcome::fail(format!("validation error: {e:#}"))
                    }
                }
            }
            Err(e) => {
                log::warn!("Could not write patch file: {e}");
                ValidationOutcome::fail(format!("could not write patch file: {e}"))
            }
        };

        let passed = verdict.passed();
        outcome.metrics.record_validation(passed);
        log::info!(
            "Attempt {}: validation {}",
            candidate.attempt_index + 1,
            verdict.verdict
        );

        outcome.attempts.push(RepairAttempt {
            attempt_index: candidate.attempt_index,
            patch_text: candidate.patch_text,
            explanation: candidate.explanation,
            estimated_risk: candidate.estimated_risk,
            validation_verdict: Some(verdict.verdict),
            token_usage: candidate.token_usage,
            raw_fallback: candidate.raw_fallback,
            looks_like_diff: diff_like,
            failure_reason: (!passed).then(|| "validation failed".to_string()),
        });

        verdict
    }
}
