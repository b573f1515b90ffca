//! Exhaustive mining

use super::{negatives_of, positive_pairs, MinedSamples, Miner, Triplet};
use ndarray::ArrayView2;

/// Every positive pair combined with every negative of its anchor
#[derive(Debug, Clone, Default)]
pub struct AllPairs;

impl AllPairs {
    pub fn new() -> Self {
        Self
    }
}

impl Miner for AllPairs {
    fn mine(&mut self, _embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> MinedSamples {
        let mut triplets = Vec::new();
        for (anchor, positive) in positive_pairs(labels) {
            for negative in negatives_of(labels, anchor) {
                triplets.push(Triplet::new(anchor, positive, negative));
            }
        }
        MinedSamples::new(triplets)
    }

    fn name(&self) -> &'static str {
        "all"
    }
}
