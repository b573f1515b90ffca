//! Pair and triplet mining
//!
//! A [`Miner`] looks at one batch of embeddings and labels and picks the
//! (anchor, positive, negative) index triplets a metric loss trains on.
//!
//! ## Strategies
//!
//! - **all**: every positive pair with every negative of its anchor
//! - **random**: one uniformly random negative per positive pair
//! - **hard**: the nearest negative of each anchor
//! - **semihard**: the nearest negative farther than the positive
//! - **distance**: negatives drawn with distance-weighted probability
//!
//! Batches with a single label, or without any label seen twice, produce an
//! empty [`MinedSamples`]; losses treat that as zero loss and zero gradient.
//!
//! ## Example
//!
//! ```
//! use rkd::mining::{MiningStrategy, Miner};
//! use ndarray::array;
//!
//! let embeddings = array![[0.0, 0.0], [0.0, 0.1], [5.0, 5.0], [5.0, 5.1]];
//! let labels = vec![0, 0, 1, 1];
//!
//! let mut miner = MiningStrategy::All.build(0.2, 7);
//! let samples = miner.mine(embeddings.view(), &labels);
//! assert_eq!(samples.positive_pairs().len(), 2);
//! assert_eq!(samples.negative_pairs().len(), 4);
//! ```

mod all_pairs;
mod distance_weighted;
mod hard;
mod random;
mod semihard;

#[cfg(test)]
mod tests;

pub use all_pairs::AllPairs;
pub use distance_weighted::DistanceWeighted;
pub use hard::HardNegative;
pub use random::RandomNegative;
pub use semihard::SemiHardNegative;

use crate::Error;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One (anchor, positive, negative) index triplet within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triplet {
    pub anchor: usize,
    pub positive: usize,
    pub negative: usize,
}

impl Triplet {
    pub fn new(anchor: usize, positive: usize, negative: usize) -> Self {
        Self {
            anchor,
            positive,
            negative,
        }
    }
}

/// Triplets selected from one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinedSamples {
    pub triplets: Vec<Triplet>,
}

impl MinedSamples {
    pub fn new(triplets: Vec<Triplet>) -> Self {
        Self { triplets }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    /// Distinct unordered (anchor, positive) pairs, smaller index first
    pub fn positive_pairs(&self) -> Vec<(usize, usize)> {
        unordered(self.triplets.iter().map(|t| (t.anchor, t.positive)))
    }

    /// Distinct unordered (anchor, negative) pairs, smaller index first
    pub fn negative_pairs(&self) -> Vec<(usize, usize)> {
        unordered(self.triplets.iter().map(|t| (t.anchor, t.negative)))
    }
}

fn unordered(pairs: impl Iterator<Item = (usize, usize)>) -> Vec<(usize, usize)> {
    pairs
        .map(|(a, b)| (a.min(b), a.max(b)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Selects informative triplets from a batch
pub trait Miner {
    /// Pick triplets; indices refer to rows of `embeddings`
    fn mine(&mut self, embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> MinedSamples;

    /// Strategy name
    fn name(&self) -> &'static str;
}

/// Closed set of mining strategies selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningStrategy {
    Random,
    Hard,
    All,
    #[serde(rename = "semihard")]
    SemiHard,
    Distance,
}

impl MiningStrategy {
    /// Every strategy, in configuration-name order
    pub const ALL: [MiningStrategy; 5] = [
        MiningStrategy::Random,
        MiningStrategy::Hard,
        MiningStrategy::All,
        MiningStrategy::SemiHard,
        MiningStrategy::Distance,
    ];

    /// Configuration name of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            MiningStrategy::Random => "random",
            MiningStrategy::Hard => "hard",
            MiningStrategy::All => "all",
            MiningStrategy::SemiHard => "semihard",
            MiningStrategy::Distance => "distance",
        }
    }

    /// Construct the miner for this strategy
    ///
    /// `margin` is only consulted by the semi-hard strategy; `seed` only by the
    /// sampling strategies.
    pub fn build(self, margin: f32, seed: u64) -> Box<dyn Miner> {
        match self {
            MiningStrategy::Random => Box::new(RandomNegative::new(seed)),
            MiningStrategy::Hard => Box::new(HardNegative::new()),
            MiningStrategy::All => Box::new(AllPairs::new()),
            MiningStrategy::SemiHard => Box::new(SemiHardNegative::new(margin)),
            MiningStrategy::Distance => Box::new(DistanceWeighted::new(seed)),
        }
    }
}

impl fmt::Display for MiningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MiningStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MiningStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s.to_lowercase())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unknown mining strategy: {s}. Supported: random, hard, all, semihard, distance"
                ))
            })
    }
}

/// Ordered (anchor, positive) pairs whose anchor has at least one negative
///
/// Row-major order over the label-equality mask with the diagonal removed.
pub(crate) fn positive_pairs(labels: &[usize]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (a, &la) in labels.iter().enumerate() {
        if !labels.iter().any(|&l| l != la) {
            continue;
        }
        for (p, &lp) in labels.iter().enumerate() {
            if a != p && la == lp {
                pairs.push((a, p));
            }
        }
    }
    pairs
}

/// Indices whose label differs from the anchor's
pub(crate) fn negatives_of(labels: &[usize], anchor: usize) -> Vec<usize> {
    let la = labels[anchor];
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l != la)
        .map(|(i, _)| i)
        .collect()
}
