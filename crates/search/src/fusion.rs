use std::cmp::Ordering;
use std::collections::HashMap;

/// Reciprocal Rank Fusion for combining the lexical and vector rankings
#[derive(Debug, Clone, Copy)]
pub struct RRFFusion {
    /// RRF constant k (typically 60)
    k: f32,

    lexical_weight: f32,
    semantic_weight: f32,
}

impl RRFFusion {
    #[must_use]
    pub const fn new(lexical_weight: f32, semantic_weight: f32, k: f32) -> Self {
        Self {
            k,
            lexical_weight,
            semantic_weight,
        }
    }

    /// Fuse two rankings given as chunk positions, best first.
    ///
    /// RRF formula: score(d) = Σ weight_i / (k + rank_i(d))
    ///
    /// Returns `(chunk_index, fused_score)` sorted by score descending; equal
    /// scores fall back to ascending chunk index.
    #[must_use]
    pub fn fuse(&self, lexical: &[usize], semantic: &[usize]) -> Vec<(usize, f32)> {
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for (rank, idx) in lexical.iter().enumerate() {
            *scores.entry(*idx).or_insert(0.0) += self.lexical_weight / (self.k + rank as f32 + 1.0);
        }
        for (rank, idx) in semantic.iter().enumerate() {
            *scores.entry(*idx).or_insert(0.0) += self.semantic_weight / (self.k + rank as f32 + 1.0);
        }

        let mut fused: Vec<(usize, f32)> = scores.into_iter().collect();
        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        log::debug!(
            "RRF fused {} lexical + {} semantic into {} candidates",
            lexical.len(),
            semantic.len(),
            fused.len()
        );
        fused
    }
}

impl Default for RRFFusion {
    fn default() -> Self {
        Self::new(0.5, 0.5, 60.0)
    }
}
