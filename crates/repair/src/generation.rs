use crate::config::GenerationConfig;
use crate::error::{RepairError, Result};
use crate::prompt::estimate_tokens;
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the Gemini API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Raw model output plus the token accounting the rate limiter needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl GenerationResponse {
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A service that turns a prompt into free text
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Model identifier, recorded in run artifacts
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> anyhow::Result<GenerationResponse>;
}

/// Gemini `generateContent` REST client
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    endpoint: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, config: &GenerationConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RepairError::MissingCredential(API_KEY_ENV));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RepairError::Other(format!("failed to build Gemini HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Reads the key from `GEMINI_API_KEY`; a missing key is a configuration error
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| RepairError::MissingCredential(API_KEY_ENV))?;
        Self::new(api_key, config)
    }

    /// Point at a different API base, e.g. a proxy
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl GenerationService for GeminiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<GenerationResponse> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.trim())
            .json(&body)
            .send()
            .await
            .context("failed to call Gemini generateContent")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, text);
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .context("failed to parse Gemini response")?;
        into_generation(parsed, prompt)
    }
}

fn into_generation(parsed: GenerateContentResponse, prompt: &str) -> anyhow::Result<GenerationResponse> {
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            bail!("Gemini blocked the prompt: {reason}");
        }
    }

    // Estimate when usage metadata is missing
    let usage = parsed.usage_metadata.unwrap_or_default();
    Ok(GenerationResponse {
        prompt_tokens: usage
            .prompt_token_count
            .unwrap_or_else(|| estimate_tokens(prompt)),
        completion_tokens: usage
            .candidates_token_count
            .unwrap_or_else(|| estimate_tokens(&text)),
        text,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
