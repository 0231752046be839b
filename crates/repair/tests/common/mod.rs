#![allow(dead_code)]

use async_trait::async_trait;
use mender_repair::{
    estimate_tokens, GenerationResponse, GenerationService, ValidationOutcome, ValidationRequest,
    ValidationService, Verdict,
};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DIFF: &str = "--- a/src/auth/login.py\n+++ b/src/auth/login.py\n@@ -1,2 +1,2 @@\n-    return None\n+    return refresh(session)\n";

pub fn proposal(patch: &str) -> String {
    serde_json::json!({
        "patch_text": patch,
        "explanation": "refresh the expired session",
        "estimated_risk": "low",
    })
    .to_string()
}

/// Replays queued responses, then repeats a JSON proposal of `DIFF`
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<anyhow::Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: impl IntoIterator<Item = anyhow::Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<GenerationResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(proposal(DIFF)));
        let text = next?;
        Ok(GenerationResponse {
            prompt_tokens: estimate_tokens(prompt),
            completion_tokens: estimate_tokens(&text),
            text,
        })
    }
}

/// Replays queued verdicts, then repeats `fallback`
pub struct ScriptedValidator {
    verdicts: Mutex<VecDeque<anyhow::Result<Verdict>>>,
    fallback: Verdict,
    failure_logs: String,
    patches: Mutex<Vec<String>>,
}

impl ScriptedValidator {
    pub fn always(verdict: Verdict) -> Self {
        Self::new([], verdict)
    }

    pub fn new(verdicts: impl IntoIterator<Item = anyhow::Result<Verdict>>, fallback: Verdict) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            fallback,
            failure_logs: "FAILED tests/test_login.py::test_expired_session".to_string(),
            patches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure_logs(mut self, logs: impl Into<String>) -> Self {
        self.failure_logs = logs.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    /// Patch file contents, one per call
    pub fn patches(&self) -> Vec<String> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ValidationService for ScriptedValidator {
    async fn validate(&self, request: &ValidationRequest<'_>) -> anyhow::Result<ValidationOutcome> {
        let patch = tokio::fs::read_to_string(request.patch_path).await?;
        self.patches.lock().unwrap().push(patch);

        let next = self.verdicts.lock().unwrap().pop_front();
        let verdict = match next {
            Some(verdict) => verdict?,
            None => self.fallback,
        };
        Ok(match verdict {
            Verdict::Pass => ValidationOutcome::pass(),
            Verdict::Fail => ValidationOutcome::fail(self.failure_logs.clone()),
        })
    }
}
