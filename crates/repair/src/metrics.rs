use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token counts of one generation call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Counters for one run, accumulated regardless of verdicts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub generation_calls: u32,
    pub validation_calls: u32,
    /// Candidate patches that reached validation
    pub patch_attempts: u32,
    pub patch_successes: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub elapsed_secs: f64,
}

impl RunMetrics {
    pub fn record_generation(&mut self, usage: TokenUsage) {
        self.generation_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
    }

    pub fn record_validation(&mut self, passed: bool) {
        self.validation_calls += 1;
        self.patch_attempts += 1;
        if passed {
            self.patch_successes += 1;
        }
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }
}
