//! Distance-wise and angle-wise relational distillation

use super::{pdist, pdist_backward, smooth_l1, EmbeddingLoss, LossInput, LossOutput};
use crate::autograd::NORM_EPS;
use crate::Result;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

/// Pairwise distances divided by the mean positive distance
///
/// Returns `None` when the batch has no positive distance.
fn normalized_distances(e: ArrayView2<'_, f32>) -> Option<(Array2<f32>, f32, usize)> {
    let d = pdist(e, false);
    let positive: Vec<f32> = d.iter().copied().filter(|&v| v > 0.0).collect();
    if positive.is_empty() {
        return None;
    }
    let mean = positive.iter().sum::<f32>() / positive.len() as f32;
    Some((d, mean, positive.len()))
}

/// Smooth-L1 between scale-normalised student and reference distance matrices
///
/// Averaged over all `N²` entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RkdDistance;

impl RkdDistance {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingLoss for RkdDistance {
    fn name(&self) -> &'static str {
        "dist"
    }

    fn requires_reference(&self) -> bool {
        true
    }

    fn forward(&mut self, input: &LossInput<'_>) -> Result<LossOutput> {
        let reference = input.require_reference(self.name())?;
        let e = input.student;
        let n = e.nrows();

        let (Some((t_d, t_mean, _)), Some((d, mean, count))) =
            (normalized_distances(reference), normalized_distances(e))
        else {
            return Ok(LossOutput::zero(e.dim()));
        };

        let total = (n * n) as f32;
        let mut value = 0.0;
        // Gradient w.r.t. the normalised student distances
        let mut g_norm = Array2::<f32>::zeros((n, n));
        for ((idx, &s), &t) in d.indexed_iter().zip(t_d.iter()) {
            let (v, g) = smooth_l1(s / mean - t / t_mean);
            value += v / total;
            g_norm[idx] = g / total;
        }

        // nd = d / mean(d > 0): dL/dd_kl = g_kl / m - (Σ g ⊙ d) / (m² · |P|) on positive entries
        let coupling = (&g_norm * &d).sum() / (mean * mean * count as f32);
        let grad_dist = Array2::from_shape_fn((n, n), |(i, j)| {
            if d[[i, j]] > 0.0 {
                g_norm[[i, j]] / mean - coupling
            } else {
                0.0
            }
        });

        Ok(LossOutput {
            value,
            grad: pdist_backward(e, false, &grad_dist),
        })
    }

    fn value(&mut self, input: &LossInput<'_>) -> Result<f32> {
        let reference = input.require_reference(self.name())?;
        let (Some((t_d, t_mean, _)), Some((d, mean, _))) =
            (normalized_distances(reference), normalized_distances(input.student))
        else {
            return Ok(0.0);
        };
        let total = d.len() as f32;
        Ok(d.iter()
            .zip(t_d.iter())
            .map(|(&s, &t)| smooth_l1(s / mean - t / t_mean).0)
            .sum::<f32>()
            / total)
    }
}

/// Unit difference vectors `n[a, b] = normalize(e[b] - e[a])` and their norms
fn unit_differences(e: ArrayView2<'_, f32>) -> (Array3<f32>, Array2<f32>) {
    let (n, dim) = e.dim();
    let mut units = Array3::zeros((n, n, dim));
    let mut norms = Array2::zeros((n, n));
    for a in 0..n {
        for b in 0..n {
            let diff = &e.row(b) - &e.row(a);
            let norm = diff.dot(&diff).sqrt();
            norms[[a, b]] = norm;
            units
                .slice_mut(s![a, b, ..])
                .assign(&(diff / norm.max(NORM_EPS)));
        }
    }
    (units, norms)
}

/// Smooth-L1 between student and reference cosines of every triplet angle
///
/// The angle at `a` spanned by `b` and `c` is `n[a, b] · n[a, c]`; the loss is
/// averaged over all `N³` ordered triplets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RkdAngle;

impl RkdAngle {
    pub fn new() -> Self {
        Self
    }
}

impl EmbeddingLoss for RkdAngle {
    fn name(&self) -> &'static str {
        "angle"
    }

    fn requires_reference(&self) -> bool {
        true
    }

    fn forward(&mut self, input: &LossInput<'_>) -> Result<LossOutput> {
        let reference = input.require_reference(self.name())?;
        let e = input.student;
        let n = e.nrows();
        if n < 2 {
            return Ok(LossOutput::zero(e.dim()));
        }

        let (t_units, _) = unit_differences(reference);
        let (s_units, s_norms) = unit_differences(e);
        let total = (n * n * n) as f32;

        let mut out = LossOutput::zero(e.dim());
        for a in 0..n {
            let s_a = s_units.index_axis(Axis(0), a);
            let t_a = t_units.index_axis(Axis(0), a);
            let s_angle = s_a.dot(&s_a.t());
            let t_angle = t_a.dot(&t_a.t());

            let mut g_angle = Array2::<f32>::zeros((n, n));
            for ((idx, &s), &t) in s_angle.indexed_iter().zip(t_angle.iter()) {
                let (v, g) = smooth_l1(s - t);
                out.value += v / total;
                g_angle[idx] = g / total;
            }

            // angle[b, c] = n_ab · n_ac, so dL/dn_ab = Σ_c (G[b, c] + G[c, b]) n_ac
            let g_units = (&g_angle + &g_angle.t()).dot(&s_a);

            for b in 0..n {
                let norm = s_norms[[a, b]];
                if norm <= NORM_EPS {
                    continue;
                }
                let u = s_a.row(b);
                let g_u = g_units.row(b);
                let g_diff = (&g_u - &(&u * u.dot(&g_u))) / norm;
                out.grad.row_mut(b).scaled_add(1.0, &g_diff);
                out.grad.row_mut(a).scaled_add(-1.0, &g_diff);
            }
        }
        Ok(out)
    }

    fn value(&mut self, input: &LossInput<'_>) -> Result<f32> {
        let reference = input.require_reference(self.name())?;
        let e = input.student;
        let n = e.nrows();
        if n < 2 {
            return Ok(0.0);
        }

        let (t_units, _) = unit_differences(reference);
        let (s_units, _) = unit_differences(e);
        let mut value = 0.0;
        for a in 0..n {
            let s_a = s_units.index_axis(Axis(0), a);
            let t_a = t_units.index_axis(Axis(0), a);
            let s_angle = s_a.dot(&s_a.t());
            let t_angle = t_a.dot(&t_a.t());
            value += s_angle
                .iter()
                .zip(t_angle.iter())
                .map(|(&s, &t)| smooth_l1(s - t).0)
                .sum::<f32>();
        }
        Ok(value / (n * n * n) as f32)
    }
}
