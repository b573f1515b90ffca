//! Pairwise distance matrix and its gradient

use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Lower clamp for squared distances before any square root
pub const DIST_EPS: f32 = 1e-12;

fn squared_norms(e: ArrayView2<'_, f32>) -> Array1<f32> {
    e.map_axis(Axis(1), |row| row.dot(&row))
}

/// Euclidean (or squared Euclidean) distance between every pair of rows
///
/// Uses `|x|² + |y|² - 2x·y`, clamps the result to at least [`DIST_EPS`] so
/// cancellation can never feed a negative value into the square root, and
/// mirrors the upper triangle so the matrix is exactly symmetric with a zero
/// diagonal.
pub fn pdist(e: ArrayView2<'_, f32>, squared: bool) -> Array2<f32> {
    let n = e.nrows();
    let sq = squared_norms(e);
    let prod = e.dot(&e.t());

    let mut dist = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let raw = (sq[i] + sq[j] - 2.0 * prod[[i, j]]).max(DIST_EPS);
            let d = if squared { raw } else { raw.sqrt() };
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }
    dist
}

/// Gradient of `Σ grad_dist ⊙ pdist(e, squared)` with respect to `e`
///
/// Entries whose squared distance hit the clamp carry no gradient.
pub fn pdist_backward(e: ArrayView2<'_, f32>, squared: bool, grad_dist: &Array2<f32>) -> Array2<f32> {
    let n = e.nrows();
    let sq = squared_norms(e);
    let prod = e.dot(&e.t());
    let mut grad = Array2::zeros(e.raw_dim());

    for i in 0..n {
        for j in (i + 1)..n {
            let g = grad_dist[[i, j]] + grad_dist[[j, i]];
            if g == 0.0 {
                continue;
            }
            let raw = sq[i] + sq[j] - 2.0 * prod[[i, j]];
            if raw <= DIST_EPS {
                continue;
            }
            // d(raw)/d(e_i) = 2 (e_i - e_j); d(sqrt raw)/d(raw) = 1 / (2 sqrt raw)
            let coeff = if squared { 2.0 * g } else { g / raw.sqrt() };
            let diff = &e.row(i) - &e.row(j);
            grad.row_mut(i).scaled_add(coeff, &diff);
            grad.row_mut(j).scaled_add(-coeff, &diff);
        }
    }
    grad
}
