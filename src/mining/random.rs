//! Uniform random negative mining

use super::{negatives_of, positive_pairs, MinedSamples, Miner, Triplet};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One uniformly sampled negative per positive pair
#[derive(Debug, Clone)]
pub struct RandomNegative {
    rng: StdRng,
}

impl RandomNegative {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Miner for RandomNegative {
    fn mine(&mut self, _embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> MinedSamples {
        let triplets = positive_pairs(labels)
            .into_iter()
            .map(|(anchor, positive)| {
                let negatives = negatives_of(labels, anchor);
                let negative = negatives[self.rng.random_range(0..negatives.len())];
                Triplet::new(anchor, positive, negative)
            })
            .collect();
        MinedSamples::new(triplets)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
