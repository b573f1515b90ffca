//! Margin triplet loss over mined triplets

use super::{EmbeddingLoss, LossInput, LossOutput, DIST_EPS};
use crate::mining::Miner;
use crate::Result;
use ndarray::{Array1, ArrayView2};
use tracing::debug;

/// `mean(max(0, d(a, p) - d(a, n) + margin))` over the mined triplets
///
/// Distances are Euclidean. An empty mined set is a zero loss with a zero
/// gradient.
pub struct TripletLoss {
    name: &'static str,
    margin: f32,
    miner: Box<dyn Miner>,
}

impl TripletLoss {
    pub fn new(margin: f32, miner: Box<dyn Miner>) -> Self {
        Self {
            name: "triplet",
            margin,
            miner,
        }
    }

    /// Report the term under another name in step metrics
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn miner_name(&self) -> &'static str {
        self.miner.name()
    }
}

/// Clamped distance between two rows and the unit direction from `j` to `i`
fn distance(e: &ArrayView2<'_, f32>, i: usize, j: usize) -> (f32, Option<Array1<f32>>) {
    let diff = &e.row(i) - &e.row(j);
    let sq = diff.dot(&diff);
    if sq <= DIST_EPS {
        (DIST_EPS.sqrt(), None)
    } else {
        let d = sq.sqrt();
        (d, Some(diff / d))
    }
}

impl EmbeddingLoss for TripletLoss {
    fn name(&self) -> &'static str {
        self.name
    }

    fn forward(&mut self, input: &LossInput<'_>) -> Result<LossOutput> {
        let e = input.student;
        let samples = self.miner.mine(e, input.labels);
        if samples.is_empty() {
            debug!(miner = self.miner.name(), "no triplets mined, triplet loss is zero");
            return Ok(LossOutput::zero(e.dim()));
        }

        let scale = 1.0 / samples.len() as f32;
        let mut out = LossOutput::zero(e.dim());
        for t in &samples.triplets {
            let (d_ap, u_ap) = distance(&e, t.anchor, t.positive);
            let (d_an, u_an) = distance(&e, t.anchor, t.negative);
            let violation = d_ap - d_an + self.margin;
            if violation <= 0.0 {
                continue;
            }
            out.value += violation * scale;

            if let Some(u) = u_ap {
                out.grad.row_mut(t.anchor).scaled_add(scale, &u);
                out.grad.row_mut(t.positive).scaled_add(-scale, &u);
            }
            if let Some(u) = u_an {
                out.grad.row_mut(t.anchor).scaled_add(-scale, &u);
                out.grad.row_mut(t.negative).scaled_add(scale, &u);
            }
        }
        Ok(out)
    }
}
