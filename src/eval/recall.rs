//! Recall@K retrieval metric

use crate::relational::pdist;
use crate::{Error, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recall for each requested cutoff, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallAtK {
    pub ks: Vec<usize>,
    pub values: Vec<f32>,
}

impl RecallAtK {
    /// Recall at `k`, if it was requested
    pub fn get(&self, k: usize) -> Option<f32> {
        self.ks.iter().position(|&x| x == k).map(|i| self.values[i])
    }

    /// Recall at the first requested cutoff
    pub fn headline(&self) -> f32 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.ks.iter().copied().zip(self.values.iter().copied())
    }
}

impl fmt::Display for RecallAtK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("R@{k}={v:.4}")).collect();
        f.write_str(&parts.join(" "))
    }
}

/// Nearest-neighbour retrieval accuracy at each cutoff in `ks`
///
/// Neighbours of a query are all other rows ordered by squared Euclidean
/// distance, ties broken by ascending index. A query is a hit at `k` when a
/// same-label row is among its first `k` neighbours. The rank of each query's
/// nearest same-label row is computed once and shared by every cutoff.
///
/// An empty set yields zero recall for every cutoff.
pub fn recall_at_k(embeddings: ArrayView2<'_, f32>, labels: &[usize], ks: &[usize]) -> Result<RecallAtK> {
    if labels.len() != embeddings.nrows() {
        return Err(Error::ShapeMismatch {
            expected: vec![embeddings.nrows()],
            got: vec![labels.len()],
        });
    }
    if let Some(&k) = ks.iter().find(|&&k| k == 0) {
        return Err(Error::Config(format!("recall cutoff must be positive, got {k}")));
    }

    let m = labels.len();
    if m == 0 {
        return Ok(RecallAtK {
            ks: ks.to_vec(),
            values: vec![0.0; ks.len()],
        });
    }

    let dist = pdist(embeddings, true);
    // ranks[r] = number of queries whose nearest same-label row sits at rank r
    let mut ranks = vec![0usize; m];
    for q in 0..m {
        let d = |j: usize| dist[[q, j]];
        let Some(best) = (0..m)
            .filter(|&j| j != q && labels[j] == labels[q])
            .min_by(|&x, &y| d(x).total_cmp(&d(y)).then(x.cmp(&y)))
        else {
            continue;
        };
        let d_best = d(best);
        let rank = (0..m)
            .filter(|&j| j != q && (d(j) < d_best || (d(j) == d_best && j < best)))
            .count();
        ranks[rank] += 1;
    }

    // hits at k = queries whose first match has rank < k
    let mut cumulative = vec![0usize; m + 1];
    for r in 0..m {
        cumulative[r + 1] = cumulative[r] + ranks[r];
    }
    let values = ks
        .iter()
        .map(|&k| cumulative[k.min(m)] as f32 / m as f32)
        .collect();

    Ok(RecallAtK {
        ks: ks.to_vec(),
        values,
    })
}
