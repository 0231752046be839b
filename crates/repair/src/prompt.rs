use crate::error::{RepairError, Result};
use crate::parse::REFUSAL_TOKEN;
use mender_code_chunker::CodeChunk;
use std::fmt::Write as _;
use std::path::Path;

const DEFAULT_TEMPLATE: &str = r#"You are an expert software engineer fixing a reported defect.

## Defect
{ISSUE_DESCRIPTION}

## Relevant code
{CONTEXT_CHUNKS}

## Previous patch
{PREVIOUS_PATCH}

## Failure logs
{FAILURE_LOGS}

## Validation results
{VALIDATION_RESULTS}

## Instructions
- Produce a minimal fix as a unified diff (`--- a/path` / `+++ b/path` headers) against the files shown above.
- If a previous patch is shown, it failed validation; correct it using the failure logs.
- Respond with a single JSON object and nothing else:
  {"patch_text": "<unified diff>", "explanation": "<one paragraph>", "estimated_risk": "low|medium|high"}
- If the defect cannot be fixed safely from this context, set patch_text to "{REFUSAL}: <reason>".
"#;

const NONE: &str = "None";

/// Everything a single generation prompt is assembled from
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptContext<'a> {
    pub description: &'a str,
    pub chunks: &'a [CodeChunk],
    pub previous_patch: Option<&'a str>,
    pub failure_logs: Option<&'a str>,
    pub validation_results: Option<&'a str>,
}

/// Fills `{PLACEHOLDER}` slots of a prompt template
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::with_template(DEFAULT_TEMPLATE)
    }
}

impl PromptBuilder {
    /// Recognized slots: `{ISSUE_DESCRIPTION}`, `{CONTEXT_CHUNKS}`,
    /// `{PREVIOUS_PATCH}`, `{FAILURE_LOGS}`, `{VALIDATION_RESULTS}`,
    /// `{REFUSAL}`. Unknown braces are left alone.
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let template = tokio::fs::read_to_string(path).await.map_err(|e| {
            RepairError::config(format!("cannot read prompt template {}: {e}", path.display()))
        })?;
        if !template.contains("{CONTEXT_CHUNKS}") {
            log::warn!(
                "Prompt template {} has no {{CONTEXT_CHUNKS}} slot",
                path.display()
            );
        }
        Ok(Self::with_template(template))
    }

    /// Single pass: text substituted into one slot is never re-expanded
    #[must_use]
    pub fn build(&self, ctx: &PromptContext<'_>) -> String {
        let chunks = format_chunks(ctx.chunks);
        let slots = [
            ("{ISSUE_DESCRIPTION}", ctx.description),
            ("{CONTEXT_CHUNKS}", chunks.as_str()),
            ("{PREVIOUS_PATCH}", ctx.previous_patch.unwrap_or(NONE)),
            ("{FAILURE_LOGS}", ctx.failure_logs.unwrap_or(NONE)),
            ("{VALIDATION_RESULTS}", ctx.validation_results.unwrap_or(NONE)),
            ("{REFUSAL}", REFUSAL_TOKEN),
        ];

        let mut out = String::with_capacity(self.template.len() + chunks.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            match slots.iter().find(|(slot, _)| tail.starts_with(slot)) {
                Some((slot, value)) => {
                    out.push_str(value);
                    rest = &tail[slot.len()..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Numbered chunk listing with path and line range headers
#[must_use]
pub fn format_chunks(chunks: &[CodeChunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = write!(
            out,
            "\n### Chunk {}: {} (lines {}-{})\n```\n{}\n```\n",
            i + 1,
            chunk.file_path,
            chunk.start_line,
            chunk.end_line,
            chunk.content
        );
    }
    out
}

/// Roughly 4 characters per token
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// The last `max_chars` characters of `text`
#[must_use]
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    text.char_indices()
        .nth(skip)
        .map_or("", |(offset, _)| &text[offset..])
}
