//! # Mender Confidence
//!
//! Turns the outcome of one repair run into a 0-100 confidence score and a
//! `Low` / `Medium` / `High` risk rating.
//!
//! ```
//! use mender_confidence::{Complexity, ConfidenceInput, ConfidenceScorer, RiskRating};
//!
//! let result = ConfidenceScorer::default().score(&ConfidenceInput {
//!     patch_generated: true,
//!     triage_score: 10,
//!     complexity: Complexity::Low,
//!     validation_passed: true,
//!     repair_attempts: 0,
//! });
//! assert!(result.score >= 85.0);
//! assert_eq!(result.risk, RiskRating::Low);
//! ```

mod scorer;
mod types;

pub use scorer::{ConfidenceScorer, ConfidenceWeights};
pub use types::{Complexity, ConfidenceFactors, ConfidenceInput, ConfidenceResult, RiskRating};
