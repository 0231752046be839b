use serde::{Deserialize, Serialize};

/// Marker a model emits when it declines to patch a defect
pub const REFUSAL_TOKEN: &str = "CANNOT_FIX_SAFELY";

/// The structured object a model is asked to return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchProposal {
    #[serde(default)]
    pub patch_text: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "unknown_risk")]
    pub estimated_risk: String,
}

fn unknown_risk() -> String {
    "unknown".to_string()
}

/// Every way a generation response can be interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    /// A JSON object with a non-empty patch
    Parsed(PatchProposal),
    /// No JSON object found; the whole response is taken as the patch
    RawFallback { patch_text: String },
    /// The model refused to patch this defect
    Declined { reason: String },
    /// Nothing usable in the response
    Empty,
}

impl ParsedResponse {
    /// Patch text for the variants that carry one
    #[must_use]
    pub fn patch_text(&self) -> Option<&str> {
        match self {
            Self::Parsed(proposal) => Some(&proposal.patch_text),
            Self::RawFallback { patch_text } => Some(patch_text),
            Self::Declined { .. } | Self::Empty => None,
        }
    }
}

/// Interpret raw model output.
///
/// The refusal token wins over everything else, then an empty patch, then
/// the JSON/raw distinction.
#[must_use]
pub fn parse_response(text: &str) -> ParsedResponse {
    match parse_proposal(text) {
        Ok(proposal) => {
            for field in [&proposal.patch_text, &proposal.explanation] {
                if let Some(reason) = refusal_reason(field) {
                    return ParsedResponse::Declined { reason };
                }
            }
            if proposal.patch_text.trim().is_empty() {
                return ParsedResponse::Empty;
            }
            ParsedResponse::Parsed(proposal)
        }
        Err(e) => {
            if let Some(reason) = refusal_reason(text) {
                return ParsedResponse::Declined { reason };
            }
            if text.trim().is_empty() {
                return ParsedResponse::Empty;
            }
            log::warn!("Response is not a JSON patch object ({e}); using raw text");
            ParsedResponse::RawFallback {
                patch_text: text.to_string(),
            }
        }
    }
}

/// First candidate slice that deserializes wins
fn parse_proposal(text: &str) -> Result<PatchProposal, serde_json::Error> {
    let mut last_err = None;
    for candidate in json_candidates(text) {
        match serde_json::from_str::<PatchProposal>(candidate.trim()) {
            Ok(proposal) => return Ok(proposal),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => serde_json::from_str::<PatchProposal>(text.trim()),
    }
}

/// Whether text carries unified-diff file headers
#[must_use]
pub fn looks_like_diff(patch: &str) -> bool {
    patch.contains("---") && patch.contains("+++")
}

/// Slices that may hold the JSON object, most specific first: a ```json
/// fence, a bare fence, then the span from the first `{` to the last `}`.
/// A fence inside `patch_text` cuts the fenced slices short, so the brace
/// span of the whole text is always tried too.
fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates: Vec<&str> = Vec::with_capacity(4);
    for slice in [fenced(text, "```json"), fenced(text, "```")]
        .into_iter()
        .flatten()
        .chain([text])
    {
        for candidate in [slice, brace_span(slice)] {
            if !candidate.trim().is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

fn brace_span(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn fenced<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let start = text.find(fence)? + fence.len();
    let len = text[start..].find("```")?;
    Some(&text[start..start + len])
}

fn refusal_reason(text: &str) -> Option<String> {
    let at = text.find(REFUSAL_TOKEN)?;
    let reason = text[at + REFUSAL_TOKEN.len()..]
        .trim_start_matches(':')
        .trim();
    Some(if reason.is_empty() {
        "declined".to_string()
    } else {
        reason.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DIFF: &str = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-a\n+b\n";

    fn proposal_json(patch: &str) -> String {
        serde_json::json!({
            "patch_text": patch,
            "explanation": "swap a for b",
            "estimated_risk": "low",
        })
        .to_string()
    }

    #[test]
    fn fenced_json() {
        let text = format!("Here is the fix:\n```json\n{}\n```\nThanks", proposal_json(DIFF));
        match parse_response(&text) {
            ParsedResponse::Parsed(p) => {
                assert_eq!(p.patch_text, DIFF);
                assert_eq!(p.explanation, "swap a for b");
                assert_eq!(p.estimated_risk, "low");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_fence_and_preamble() {
        let bare = format!("```\n{}\n```", proposal_json(DIFF));
        assert!(matches!(parse_response(&bare), ParsedResponse::Parsed(_)));

        let preamble = format!("Sure! {} Hope this helps.", proposal_json(DIFF));
        assert!(matches!(parse_response(&preamble), ParsedResponse::Parsed(_)));
    }

    #[test]
    fn missing_fields_default() {
        let parsed = parse_response(r#"{"patch_text": "--- a\n+++ b"}"#);
        assert_eq!(
            parsed,
            ParsedResponse::Parsed(PatchProposal {
                patch_text: "--- a\n+++ b".to_string(),
                explanation: String::new(),
                estimated_risk: "unknown".to_string(),
            })
        );
    }

    #[test]
    fn raw_fallback_when_no_object() {
        let parsed = parse_response(DIFF);
        assert_eq!(
            parsed,
            ParsedResponse::RawFallback {
                patch_text: DIFF.to_string()
            }
        );
        assert_eq!(parsed.patch_text(), Some(DIFF));
    }

    #[test]
    fn refusal_in_patch_or_raw_text() {
        let json = proposal_json("CANNOT_FIX_SAFELY: touches the billing schema");
        assert_eq!(
            parse_response(&json),
            ParsedResponse::Declined {
                reason: "touches the billing schema".to_string()
            }
        );
        assert_eq!(
            parse_response("CANNOT_FIX_SAFELY"),
            ParsedResponse::Declined {
                reason: "declined".to_string()
            }
        );
    }

    #[test]
    fn empty_patch_and_empty_response() {
        assert_eq!(parse_response(&proposal_json("  ")), ParsedResponse::Empty);
        assert_eq!(parse_response(""), ParsedResponse::Empty);
        assert_eq!(parse_response("\n\t"), ParsedResponse::Empty);
        assert_eq!(ParsedResponse::Empty.patch_text(), None);
    }

    #[test]
    fn fenced_json_with_inner_fence_in_patch() {
        let patch = "--- a/README.md\n+++ b/README.md\n@@ -1,3 +1,3 @@\n ```\n-old\n+new\n ```\n";
        let text = format!("```json\n{}\n```", proposal_json(patch));

        match parse_response(&text) {
            ParsedResponse::Parsed(p) => assert_eq!(p.patch_text, patch),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn diff_markers() {
        assert!(looks_like_diff(DIFF));
        assert!(!looks_like_diff("just replace line 3"));
        assert!(!looks_like_diff("--- only one header"));
    }
}
