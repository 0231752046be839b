use crate::types::{Complexity, ConfidenceFactors, ConfidenceInput, ConfidenceResult, RiskRating};

const LOW_RISK_MIN_SCORE: f64 = 75.0;
const HIGH_RISK_BELOW_SCORE: f64 = 50.0;

/// Relative weight of each score component; the defaults sum to 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceWeights {
    pub triage: f64,
    pub complexity: f64,
    pub validation: f64,
    pub repair_attempts: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            triage: 0.25,
            complexity: 0.20,
            validation: 0.35,
            repair_attempts: 0.20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
}

impl ConfidenceScorer {
    #[must_use]
    pub const fn with_weights(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn score(&self, input: &ConfidenceInput) -> ConfidenceResult {
        if !input.patch_generated {
            return ConfidenceResult {
                score: 0.0,
                risk: RiskRating::High,
                factors: ConfidenceFactors::NoPatch {
                    reason: "No patch generated".to_string(),
                },
            };
        }

        let triage = triage_component(input.triage_score);
        let complexity = complexity_component(input.complexity);
        let validation = if input.validation_passed { 100.0 } else { 20.0 };
        let repair_attempts = repair_component(input.repair_attempts);

        let weighted = triage * self.weights.triage
            + complexity * self.weights.complexity
            + validation * self.weights.validation
            + repair_attempts * self.weights.repair_attempts;
        let score = (weighted * 10.0).round() / 10.0;
        let risk = risk_rating(score, input.validation_passed);

        log::debug!(
            "Confidence {score} ({risk}): triage={triage:.1} complexity={complexity} validation={validation} repairs={repair_attempts}"
        );

        ConfidenceResult {
            score,
            risk,
            factors: ConfidenceFactors::Components {
                triage,
                complexity,
                validation,
                repair_attempts,
            },
        }
    }
}

/// 1 → 20 … 10 → 100, clamped
fn triage_component(triage_score: u32) -> f64 {
    (20.0 + (f64::from(triage_score) - 1.0) * 8.9).clamp(0.0, 100.0)
}

const fn complexity_component(complexity: Complexity) -> f64 {
    match complexity {
        Complexity::Low => 90.0,
        Complexity::Medium => 60.0,
        Complexity::High => 30.0,
        Complexity::Unknown => 40.0,
    }
}

const fn repair_component(attempts: u32) -> f64 {
    match attempts {
        0 => 100.0,
        1 => 70.0,
        2 => 40.0,
        _ => 20.0,
    }
}

/// `Low` is checked before `High`; a failed validation can never be `Low`
fn risk_rating(score: f64, validation_passed: bool) -> RiskRating {
    if score >= LOW_RISK_MIN_SCORE && validation_passed {
        RiskRating::Low
    } else if score < HIGH_RISK_BELOW_SCORE || !validation_passed {
        RiskRating::High
    } else {
        RiskRating::Medium
    }
}
