mod common;

use common::{proposal, ScriptedGenerator, ScriptedValidator, DIFF};
use mender_repair::{
    CodeChunk, ExhaustReason, LoopOutcome, LoopState, PromptBuilder, RateLimiter,
    RawResponsePolicy, RepairLoop, RepairSettings, RepairTask, RunArtifacts, Verdict,
    REFUSAL_TOKEN, WINDOW,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    temp: TempDir,
    artifacts: RunArtifacts,
    limiter: RateLimiter,
    prompts: PromptBuilder,
    chunks: Vec<CodeChunk>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_limiter(RateLimiter::new(900_000, Duration::from_secs(1))).await
    }

    async fn with_limiter(limiter: RateLimiter) -> Self {
        let temp = TempDir::new().expect("tempdir");
        let artifacts = RunArtifacts::create(temp.path().join("runs"), "run-1")
            .await
            .expect("artifacts");
        Self {
            temp,
            artifacts,
            limiter,
            prompts: PromptBuilder::default(),
            chunks: vec![CodeChunk::new(
                "src/auth/login.py".into(),
                1,
                2,
                "def login(session):\n    return None".into(),
            )],
        }
    }

    async fn run(
        &self,
        generator: &ScriptedGenerator,
        validator: &ScriptedValidator,
        settings: &RepairSettings,
    ) -> LoopOutcome {
        let task = RepairTask {
            run_id: "run-1",
            description: "Login fails after the session expires",
            repo_dir: self.temp.path(),
            chunks: &self.chunks,
        };
        RepairLoop::new(
            generator,
            validator,
            &self.limiter,
            &self.prompts,
            &self.artifacts,
            settings,
        )
        .run(&task)
        .await
    }
}

fn settings(max_retries: u32) -> RepairSettings {
    RepairSettings {
        max_retries,
        ..RepairSettings::default()
    }
}

#[tokio::test]
async fn always_failing_validation_exhausts_after_one_retry() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::default();
    let validator = ScriptedValidator::always(Verdict::Fail);

    let outcome = harness.run(&generator, &validator, &settings(1)).await;

    assert_eq!(generator.calls(), 2);
    assert_eq!(validator.calls(), 2);
    assert_eq!(outcome.state, LoopState::Exhausted);
    assert_eq!(outcome.reason, Some(ExhaustReason::RetriesExhausted));
    assert_eq!(
        outcome.transitions,
        vec![
            LoopState::Init,
            LoopState::Generating,
            LoopState::Validating,
            LoopState::Repairing,
            LoopState::Generating,
            LoopState::Validating,
            LoopState::Exhausted,
        ]
    );
    assert_eq!(outcome.metrics.generation_calls, 2);
    assert_eq!(outcome.metrics.patch_attempts, 2);
    assert_eq!(outcome.metrics.patch_successes, 0);
    assert_eq!(outcome.final_attempt().map(|a| a.attempt_index), Some(1));
}

#[tokio::test]
async fn call_counts_never_exceed_retries_plus_one() {
    for max_retries in 0..=3 {
        let harness = Harness::new().await;
        let generator = ScriptedGenerator::default();
        let validator = ScriptedValidator::always(Verdict::Fail);

        let outcome = harness.run(&generator, &validator, &settings(max_retries)).await;

        let limit = max_retries as usize + 1;
        assert_eq!(generator.calls(), limit, "max_retries={max_retries}");
        assert_eq!(validator.calls(), limit, "max_retries={max_retries}");
        assert_eq!(outcome.attempts.len(), limit);
        assert!(outcome.state.is_terminal());
    }
}

#[tokio::test]
async fn repair_prompt_carries_previous_patch_and_log_tail() {
    let harness = Harness::new().await;
    let first_patch = DIFF.replace("refresh(session)", "session.renew()");
    let generator = ScriptedGenerator::new([Ok(proposal(&first_patch)), Ok(proposal(DIFF))]);
    let logs = format!("{}AssertionError: session not refreshed", "x".repeat(5000));
    let validator =
        ScriptedValidator::new([Ok(Verdict::Fail)], Verdict::Pass).with_failure_logs(logs);

    let outcome = harness.run(&generator, &validator, &settings(1)).await;

    assert!(outcome.passed());
    assert_eq!(outcome.transitions.last(), Some(&LoopState::Passed));
    assert_eq!(outcome.metrics.patch_successes, 1);
    assert_eq!(validator.patches(), vec![first_patch.clone(), DIFF.to_string()]);

    let prompts = generator.prompts();
    assert!(prompts[0].contains("## Previous patch\nNone"));
    assert!(prompts[1].contains(&first_patch));
    assert!(prompts[1].contains("AssertionError: session not refreshed"));
    assert!(prompts[1].contains(&"x".repeat(1000)));
    assert!(!prompts[1].contains(&"x".repeat(2000)));

    let final_attempt = outcome.final_attempt().expect("validated attempt");
    assert_eq!(final_attempt.patch_text, DIFF);
    assert_eq!(final_attempt.validation_verdict, Some(Verdict::Pass));
    assert!(final_attempt.looks_like_diff);
}

#[tokio::test]
async fn refusal_ends_the_run_without_validation() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([Ok(proposal(&format!(
        "{REFUSAL_TOKEN}: requires a schema migration"
    )))]);
    let validator = ScriptedValidator::always(Verdict::Pass);

    let outcome = harness.run(&generator, &validator, &settings(3)).await;

    assert_eq!(generator.calls(), 1);
    assert_eq!(validator.calls(), 0);
    assert_eq!(outcome.state, LoopState::Exhausted);
    assert_eq!(
        outcome.reason,
        Some(ExhaustReason::Declined {
            detail: "requires a schema migration".to_string()
        })
    );
    assert_eq!(
        outcome.reason.as_ref().map(ToString::to_string),
        Some("declined".to_string())
    );
    assert!(outcome.final_attempt().is_none());
}

#[tokio::test]
async fn raw_response_is_validated_as_patch_by_default() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([Ok(DIFF.to_string())]);
    let validator = ScriptedValidator::always(Verdict::Pass);

    let outcome = harness.run(&generator, &validator, &settings(1)).await;

    assert!(outcome.passed());
    assert_eq!(validator.patches(), vec![DIFF.to_string()]);
    assert!(outcome.attempts[0].raw_fallback);
    assert_eq!(outcome.attempts[0].estimated_risk, None);
}

#[tokio::test]
async fn raw_response_can_be_treated_as_failure() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([Ok(DIFF.to_string()), Ok(DIFF.to_string())]);
    let validator = ScriptedValidator::always(Verdict::Pass);
    let settings = RepairSettings {
        raw_response_policy: RawResponsePolicy::TreatAsFailure,
        ..settings(1)
    };

    let outcome = harness.run(&generator, &validator, &settings).await;

    assert_eq!(generator.calls(), 2);
    assert_eq!(validator.calls(), 0);
    assert_eq!(outcome.reason, Some(ExhaustReason::RetriesExhausted));
    assert!(outcome.attempts.iter().all(|a| a.raw_fallback && a.validation_verdict.is_none()));
    assert!(generator.prompts()[1].contains("response was not a JSON patch object"));
}

#[tokio::test]
async fn generation_error_consumes_a_retry() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([
        Err(anyhow::anyhow!("503 Service Unavailable")),
        Ok(proposal(DIFF)),
    ]);
    let validator = ScriptedValidator::always(Verdict::Pass);

    let outcome = harness.run(&generator, &validator, &settings(1)).await;

    assert!(outcome.passed());
    assert_eq!(generator.calls(), 2);
    assert_eq!(validator.calls(), 1);
    assert_eq!(outcome.attempts[0].validation_verdict, None);
    assert!(outcome.attempts[0]
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("503")));

    // The failed call's reservation is returned to the window
    assert_eq!(
        harness.limiter.used_tokens(),
        outcome.attempts[1].token_usage.total()
    );
}

#[tokio::test]
async fn generation_errors_with_no_retries_left_exhaust() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([Err(anyhow::anyhow!("timeout"))]);
    let validator = ScriptedValidator::always(Verdict::Pass);

    let outcome = harness.run(&generator, &validator, &settings(0)).await;

    assert_eq!(outcome.reason, Some(ExhaustReason::RetriesExhausted));
    assert_eq!(validator.calls(), 0);
    assert_eq!(harness.limiter.used_tokens(), 0);
}

#[tokio::test]
async fn empty_patch_consumes_a_retry() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([Ok(proposal("   ")), Ok(proposal(DIFF))]);
    let validator = ScriptedValidator::always(Verdict::Pass);

    let outcome = harness.run(&generator, &validator, &settings(1)).await;

    assert!(outcome.passed());
    assert_eq!(validator.calls(), 1);
    assert_eq!(
        outcome.attempts[0].failure_reason.as_deref(),
        Some("Empty patch content")
    );
}

#[tokio::test]
async fn validator_error_counts_as_fail() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::default();
    let validator = ScriptedValidator::new(
        [Err(anyhow::anyhow!("validation.json is not valid JSON"))],
        Verdict::Pass,
    );

    let outcome = harness.run(&generator, &validator, &settings(1)).await;

    assert!(outcome.passed());
    assert_eq!(outcome.attempts[0].validation_verdict, Some(Verdict::Fail));
    assert!(generator.prompts()[1].contains("validation.json is not valid JSON"));
}

#[tokio::test]
async fn artifacts_hold_latest_prompt_response_and_every_patch() {
    let harness = Harness::new().await;
    let generator = ScriptedGenerator::new([Ok(proposal("--- a\n+++ b\n-first\n+second\n"))]);
    let validator = ScriptedValidator::always(Verdict::Fail);

    harness.run(&generator, &validator, &settings(1)).await;

    let dir = harness.artifacts.dir();
    let prompt = tokio::fs::read_to_string(dir.join("prompt.txt")).await.expect("prompt");
    assert_eq!(prompt, generator.prompts()[1]);

    let response: serde_json::Value = serde_json::from_str(
        &tokio::fs::read_to_string(dir.join("response.json")).await.expect("response"),
    )
    .expect("json");
    assert_eq!(response["model"], "scripted");
    assert_eq!(response["attempt_index"], 1);

    assert!(dir.join("attempt-0.patch").is_file());
    assert!(dir.join("attempt-1.patch").is_file());
}

#[tokio::test(start_paused = true)]
async fn retry_waits_for_the_window_when_budget_is_spent() {
    // The first call fills the whole budget, so the retry must wait it out
    let harness = Harness::with_limiter(RateLimiter::new(1, Duration::from_secs(1))).await;
    let generator = ScriptedGenerator::default();
    let validator = ScriptedValidator::always(Verdict::Fail);

    let started = tokio::time::Instant::now();
    let outcome = harness.run(&generator, &validator, &settings(1)).await;
    let elapsed = started.elapsed();

    assert_eq!(generator.calls(), 2);
    assert_eq!(outcome.reason, Some(ExhaustReason::RetriesExhausted));
    assert!(elapsed >= WINDOW, "elapsed {elapsed:?}");
    assert_eq!(
        harness.limiter.used_tokens(),
        outcome.attempts[1].token_usage.total()
    );
}
