use crate::embeddings::EmbeddingVector;
use crate::error::{Result, VectorStoreError};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One search hit: position of the stored vector and its similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub idx: usize,
    pub score: f32,
}

/// Which nearest-neighbor structure backs a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exact L2 search over a contiguous matrix
    #[default]
    Flat,
    /// Dot-product ranking over individually stored vectors
    BruteForce,
}

/// Capability shared by every index variant.
///
/// For unit-length vectors both variants must return the same ranking:
/// `|q - v|² = 2 - 2·q·v`, so ascending L2 distance equals descending dot
/// product. Ties are broken by insertion order.
pub trait NearestNeighborIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn dimension(&self) -> usize;

    /// Append a vector; returns its position
    fn add(&mut self, vector: &EmbeddingVector) -> Result<usize>;

    /// Up to `k` neighbors, best first. Positions are always `< len()`.
    fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<Neighbor>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}

/// Build the index variant selected at construction time
#[must_use]
pub fn build_index(kind: IndexKind, dimension: usize) -> Box<dyn NearestNeighborIndex> {
    match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension)),
        IndexKind::BruteForce => Box::new(BruteForceIndex::new(dimension)),
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(VectorStoreError::InvalidDimension { expected, actual })
    }
}

fn rank(mut scored: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.idx.cmp(&b.idx))
    });
    scored.truncate(k);
    scored
}

/// Exact nearest-neighbor search by squared L2 distance
pub struct FlatIndex {
    dimension: usize,
    matrix: Array2<f32>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            matrix: Array2::zeros((0, dimension)),
        }
    }
}

impl NearestNeighborIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&mut self, vector: &EmbeddingVector) -> Result<usize> {
        check_dimension(self.dimension, vector.dimension())?;
        let position = self.matrix.nrows();
        self.matrix
            .push_row(ArrayView1::from(vector.as_slice()))
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        Ok(position)
    }

    fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<Neighbor>> {
        check_dimension(self.dimension, query.dimension())?;
        if k == 0 || self.matrix.nrows() == 0 {
            return Ok(Vec::new());
        }

        let q = ArrayView1::from(query.as_slice());
        let scored = self
            .matrix
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(idx, row)| {
                let distance: f32 = row
                    .iter()
                    .zip(q.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                // cosine-equivalent for unit vectors
                Neighbor {
                    idx,
                    score: 1.0 - distance / 2.0,
                }
            })
            .collect();

        Ok(rank(scored, k))
    }

    fn len(&self) -> usize {
        self.matrix.nrows()
    }

    fn clear(&mut self) {
        self.matrix = Array2::zeros((0, self.dimension));
    }
}

/// Brute-force dot-product ranking over stored vectors
pub struct BruteForceIndex {
    dimension: usize,
    vectors: Vec<EmbeddingVector>,
}

impl BruteForceIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }
}

impl NearestNeighborIndex for BruteForceIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::BruteForce
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&mut self, vector: &EmbeddingVector) -> Result<usize> {
        check_dimension(self.dimension, vector.dimension())?;
        self.vectors.push(vector.clone());
        Ok(self.vectors.len() - 1)
    }

    fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<Neighbor>> {
        check_dimension(self.dimension, query.dimension())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| Neighbor {
                idx,
                score: vector.dot(query),
            })
            .collect();

        Ok(rank(scored, k))
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn clear(&mut self) {
        self.vectors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{fallback_embed, EMBEDDING_DIMENSION};
    use pretty_assertions::assert_eq;

    fn unit(values: &[f32]) -> EmbeddingVector {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        EmbeddingVector::new(values.iter().map(|v| v / norm).collect())
    }

    fn hashed(text: &str) -> EmbeddingVector {
        EmbeddingVector::new(fallback_embed(text, EMBEDDING_DIMENSION))
    }

    #[test]
    fn test_add_and_search() {
        for kind in [IndexKind::Flat, IndexKind::BruteForce] {
            let mut index = build_index(kind, 3);
            index.add(&unit(&[1.0, 0.0, 0.0])).unwrap();
            index.add(&unit(&[0.9, 0.1, 0.0])).unwrap();
            index.add(&unit(&[0.0, 1.0, 0.0])).unwrap();
            assert_eq!(index.len(), 3);
            assert_eq!(index.kind(), kind);

            let results = index.search(&unit(&[1.0, 0.0, 0.0]), 2).unwrap();
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].idx, 0);
            assert!((results[0].score - 1.0).abs() < 1e-5);
            assert_eq!(results[1].idx, 1);
            assert!(results[1].score > 0.9);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        for kind in [IndexKind::Flat, IndexKind::BruteForce] {
            let mut index = build_index(kind, 3);
            assert!(index.add(&EmbeddingVector::new(vec![1.0, 0.0])).is_err());

            index.add(&unit(&[1.0, 0.0, 0.0])).unwrap();
            assert!(index.search(&EmbeddingVector::new(vec![1.0, 0.0]), 1).is_err());
        }
    }

    #[test]
    fn test_k_larger_than_len_and_zero() {
        for kind in [IndexKind::Flat, IndexKind::BruteForce] {
            let mut index = build_index(kind, 3);
            assert!(index.search(&unit(&[1.0, 1.0, 0.0]), 4).unwrap().is_empty());

            index.add(&unit(&[1.0, 0.0, 0.0])).unwrap();
            index.add(&unit(&[0.0, 0.0, 1.0])).unwrap();
            let results = index.search(&unit(&[1.0, 1.0, 0.0]), 10).unwrap();
            assert_eq!(results.len(), 2);
            assert!(results.iter().all(|n| n.idx < index.len()));
            assert!(index.search(&unit(&[1.0, 1.0, 0.0]), 0).unwrap().is_empty());

            index.clear();
            assert!(index.is_empty());
        }
    }

    #[test]
    fn flat_and_brute_force_rank_identically() {
        let corpus: Vec<EmbeddingVector> = (0..64)
            .map(|i| hashed(&format!("chunk body number {i}")))
            .collect();

        let mut flat = FlatIndex::new(EMBEDDING_DIMENSION);
        let mut brute = BruteForceIndex::new(EMBEDDING_DIMENSION);
        for vector in &corpus {
            flat.add(vector).unwrap();
            brute.add(vector).unwrap();
        }

        for query in ["login timeout", "chunk body number 7", "panic in parser"] {
            let q = hashed(query);
            let flat_ids: Vec<usize> = flat.search(&q, 10).unwrap().iter().map(|n| n.idx).collect();
            let brute_ids: Vec<usize> =
                brute.search(&q, 10).unwrap().iter().map(|n| n.idx).collect();
            assert_eq!(flat_ids, brute_ids, "query {query}");
        }

        let exact = flat.search(&hashed("chunk body number 7"), 1).unwrap();
        assert_eq!(exact[0].idx, 7);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut index = BruteForceIndex::new(2);
        index.add(&unit(&[1.0, 0.0])).unwrap();
        index.add(&unit(&[0.0, 1.0])).unwrap();
        index.add(&unit(&[1.0, 0.0])).unwrap();

        let ids: Vec<usize> = index
            .search(&unit(&[1.0, 0.0]), 3)
            .unwrap()
            .iter()
            .map(|n| n.idx)
            .collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }
}
