//! Distance-weighted negative sampling
//!
//! For unit vectors in `d` dimensions the pairwise distance density is
//! proportional to `q(δ) = δ^(d-2) · (1 - δ²/4)^((d-3)/2)`. Sampling negatives
//! with weight `1/q(δ)` spreads the selected negatives over all difficulties
//! instead of concentrating on the hardest or easiest ones.

use super::{negatives_of, positive_pairs, MinedSamples, Miner, Triplet};
use crate::relational::pdist;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Distances below this are clipped before weighting
pub const DEFAULT_CUTOFF: f32 = 0.5;

/// Negatives at or beyond this distance contribute no loss and get no weight
pub const DEFAULT_NONZERO_LOSS_CUTOFF: f32 = 1.4;

#[derive(Debug, Clone)]
pub struct DistanceWeighted {
    cutoff: f32,
    nonzero_loss_cutoff: f32,
    rng: StdRng,
}

impl DistanceWeighted {
    pub fn new(seed: u64) -> Self {
        Self::with_cutoffs(seed, DEFAULT_CUTOFF, DEFAULT_NONZERO_LOSS_CUTOFF)
    }

    pub fn with_cutoffs(seed: u64, cutoff: f32, nonzero_loss_cutoff: f32) -> Self {
        Self {
            cutoff,
            nonzero_loss_cutoff,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sampling weights over `negatives`, normalised to sum to one
    fn weights(&self, dist: &Array2<f32>, dim: usize, anchor: usize, negatives: &[usize]) -> Vec<f32> {
        let d = dim as f32;
        let log_weights: Vec<f32> = negatives
            .iter()
            .map(|&n| {
                let delta = dist[[anchor, n]].max(self.cutoff);
                let tail = (1.0 - 0.25 * delta * delta).max(f32::MIN_POSITIVE);
                (2.0 - d) * delta.ln() - ((d - 3.0) / 2.0) * tail.ln()
            })
            .collect();
        let max_log = log_weights
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);

        let mut weights: Vec<f32> = negatives
            .iter()
            .zip(&log_weights)
            .map(|(&n, &lw)| {
                if dist[[anchor, n]] < self.nonzero_loss_cutoff {
                    (lw - max_log).exp()
                } else {
                    0.0
                }
            })
            .collect();

        let total: f32 = weights.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            weights.iter_mut().for_each(|w| *w = 1.0);
        }
        let total: f32 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);
        weights
    }

    fn sample(&mut self, weights: &[f32]) -> usize {
        let u: f32 = self.rng.random();
        let mut cumulative = 0.0;
        for (i, &w) in weights.iter().enumerate() {
            cumulative += w;
            if u < cumulative {
                return i;
            }
        }
        // Rounding can leave the cumulative sum just below 1
        weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
    }
}

impl Miner for DistanceWeighted {
    fn mine(&mut self, embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> MinedSamples {
        let pairs = positive_pairs(labels);
        if pairs.is_empty() {
            return MinedSamples::empty();
        }

        let mut normalized = embeddings.to_owned();
        for mut row in normalized.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt().max(crate::autograd::NORM_EPS);
            row.mapv_inplace(|v| v / norm);
        }
        let dist = pdist(normalized.view(), false);
        let dim = embeddings.ncols();

        let mut triplets = Vec::with_capacity(pairs.len());
        for (anchor, positive) in pairs {
            let negatives = negatives_of(labels, anchor);
            let weights = self.weights(&dist, dim, anchor, &negatives);
            let negative = negatives[self.sample(&weights)];
            triplets.push(Triplet::new(anchor, positive, negative));
        }
        MinedSamples::new(triplets)
    }

    fn name(&self) -> &'static str {
        "distance"
    }
}
