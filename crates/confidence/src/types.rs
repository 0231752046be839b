use serde::{Deserialize, Serialize};
use std::fmt;

/// Estimated difficulty of the defect, as reported by triage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Complexity {
    /// Case-insensitive; anything unrecognized is `Unknown`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskRating {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        })
    }
}

/// Everything the scorer needs to know about a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceInput {
    pub patch_generated: bool,
    /// Triage priority, nominally 1..=10
    pub triage_score: u32,
    pub complexity: Complexity,
    pub validation_passed: bool,
    /// Repairs needed after the first attempt
    pub repair_attempts: u32,
}

/// Per-component breakdown behind a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfidenceFactors {
    Components {
        triage: f64,
        complexity: f64,
        validation: f64,
        repair_attempts: f64,
    },
    NoPatch {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    /// 0..=100, one decimal place
    pub score: f64,
    pub risk: RiskRating,
    pub factors: ConfidenceFactors,
}

impl ConfidenceResult {
    /// Human-readable review guidance
    #[must_use]
    pub fn recommendation(&self) -> &'static str {
        match self.risk {
            RiskRating::Low if self.score >= 75.0 => {
                "✅ High confidence - Recommended for auto-merge"
            }
            RiskRating::Medium if self.score >= 60.0 => "⚠️ Medium confidence - Review recommended",
            _ => "❌ Low confidence - Manual review required",
        }
    }
}
