//! Semi-hard negative mining

use super::{negatives_of, positive_pairs, MinedSamples, Miner, Triplet};
use crate::relational::pdist;
use ndarray::ArrayView2;

/// Negative farther than the positive but inside the margin
///
/// Preference order for each (anchor, positive):
/// 1. nearest negative with `d_ap < d_an < d_ap + margin`
/// 2. nearest negative with `d_an > d_ap`
/// 3. farthest negative
#[derive(Debug, Clone)]
pub struct SemiHardNegative {
    margin: f32,
}

impl SemiHardNegative {
    pub fn new(margin: f32) -> Self {
        Self {
            margin: margin.max(0.0),
        }
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }
}

impl Miner for SemiHardNegative {
    fn mine(&mut self, embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> MinedSamples {
        let pairs = positive_pairs(labels);
        if pairs.is_empty() {
            return MinedSamples::empty();
        }
        let dist = pdist(embeddings, false);

        let triplets = pairs
            .into_iter()
            .filter_map(|(anchor, positive)| {
                let d_ap = dist[[anchor, positive]];
                let negatives = negatives_of(labels, anchor);
                let d = |n: usize| dist[[anchor, n]];

                let in_window = negatives
                    .iter()
                    .copied()
                    .filter(|&n| d(n) > d_ap && d(n) < d_ap + self.margin)
                    .min_by(|&x, &y| d(x).total_cmp(&d(y)));
                let farther = || {
                    negatives
                        .iter()
                        .copied()
                        .filter(|&n| d(n) > d_ap)
                        .min_by(|&x, &y| d(x).total_cmp(&d(y)))
                };
                // max_by keeps the last maximum; reverse so ties go to the lower index
                let farthest = || {
                    negatives
                        .iter()
                        .copied()
                        .rev()
                        .max_by(|&x, &y| d(x).total_cmp(&d(y)))
                };

                in_window
                    .or_else(farther)
                    .or_else(farthest)
                    .map(|negative| Triplet::new(anchor, positive, negative))
            })
            .collect();
        MinedSamples::new(triplets)
    }

    fn name(&self) -> &'static str {
        "semihard"
    }
}
