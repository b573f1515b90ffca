//! Hardest-negative mining

use super::{negatives_of, positive_pairs, MinedSamples, Miner, Triplet};
use crate::relational::pdist;
use ndarray::ArrayView2;

/// Nearest differently-labelled embedding for every anchor
///
/// Ties go to the lower index.
#[derive(Debug, Clone, Default)]
pub struct HardNegative;

impl HardNegative {
    pub fn new() -> Self {
        Self
    }
}

impl Miner for HardNegative {
    fn mine(&mut self, embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> MinedSamples {
        let pairs = positive_pairs(labels);
        if pairs.is_empty() {
            return MinedSamples::empty();
        }
        let dist = pdist(embeddings, false);

        let triplets = pairs
            .into_iter()
            .filter_map(|(anchor, positive)| {
                negatives_of(labels, anchor)
                    .into_iter()
                    .min_by(|&x, &y| dist[[anchor, x]].total_cmp(&dist[[anchor, y]]))
                    .map(|negative| Triplet::new(anchor, positive, negative))
            })
            .collect();
        MinedSamples::new(triplets)
    }

    fn name(&self) -> &'static str {
        "hard"
    }
}
