//! Hard dark-rank distillation

use super::{pdist, pdist_backward, EmbeddingLoss, LossInput, LossOutput};
use crate::Result;
use ndarray::Array2;

/// Number of reference neighbours whose order is transferred
pub const DEFAULT_PERMUTE_LEN: usize = 4;

/// Listwise ranking loss over the reference's nearest neighbours
///
/// Similarity scores are `-alpha · d^beta`. For each row the reference's
/// `permute_len` nearest neighbours (self excluded, ties by index) fix an
/// order, and the loss is the negative Plackett-Luce log-likelihood of that
/// order under the student scores, averaged over rows.
#[derive(Debug, Clone, Copy)]
pub struct HardDarkRank {
    alpha: f32,
    beta: f32,
    permute_len: usize,
}

impl HardDarkRank {
    pub fn new(alpha: f32, beta: f32) -> Self {
        Self::with_permute_len(alpha, beta, DEFAULT_PERMUTE_LEN)
    }

    pub fn with_permute_len(alpha: f32, beta: f32, permute_len: usize) -> Self {
        Self {
            alpha,
            beta,
            permute_len,
        }
    }

    fn score(&self, d: f32) -> f32 {
        -self.alpha * d.powf(self.beta)
    }

    /// Reference neighbour order for one row
    fn permutation(&self, t_dist: &Array2<f32>, row: usize, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..t_dist.ncols()).filter(|&j| j != row).collect();
        order.sort_by(|&x, &y| {
            self.score(t_dist[[row, y]])
                .total_cmp(&self.score(t_dist[[row, x]]))
                .then(x.cmp(&y))
        });
        order.truncate(len);
        order
    }
}

impl EmbeddingLoss for HardDarkRank {
    fn name(&self) -> &'static str {
        "dark"
    }

    fn requires_reference(&self) -> bool {
        true
    }

    fn forward(&mut self, input: &LossInput<'_>) -> Result<LossOutput> {
        let reference = input.require_reference(self.name())?;
        let e = input.student;
        let n = e.nrows();
        let len = self.permute_len.min(n.saturating_sub(1));
        if len == 0 {
            return Ok(LossOutput::zero(e.dim()));
        }

        let t_dist = pdist(reference, false);
        let s_dist = pdist(e, false);
        let rows = n as f32;

        let mut value = 0.0;
        let mut grad_dist = Array2::<f32>::zeros((n, n));
        for i in 0..n {
            let perm = self.permutation(&t_dist, i, len);
            let scores: Vec<f32> = perm.iter().map(|&j| self.score(s_dist[[i, j]])).collect();

            // log_prob = Σ_j (o_j - logsumexp(o_j..))
            // d log_prob / d o_k = 1 - Σ_{j ≤ k} softmax(o_j..)_k
            let mut g_scores = vec![1.0f32; len];
            for j in 0..len {
                let tail = &scores[j..];
                let max = tail.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let lse = max + tail.iter().map(|&o| (o - max).exp()).sum::<f32>().ln();
                value -= (scores[j] - lse) / rows;
                for k in j..len {
                    g_scores[k] -= (scores[k] - lse).exp();
                }
            }

            for (k, &j) in perm.iter().enumerate() {
                let d = s_dist[[i, j]];
                // d score / d d = -alpha · beta · d^(beta - 1)
                let d_score = -self.alpha * self.beta * d.powf(self.beta - 1.0);
                grad_dist[[i, j]] += -g_scores[k] / rows * d_score;
            }
        }

        Ok(LossOutput {
            value,
            grad: pdist_backward(e, false, &grad_dist),
        })
    }
}
