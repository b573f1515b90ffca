//! Relational losses over embedding geometry
//!
//! Every loss consumes a batch of student embeddings (and, for the
//! teacher-guided terms, the matching reference embeddings) and returns its
//! scalar value together with the analytic gradient with respect to the
//! student embeddings. Gradients from several terms are summed by
//! [`LossComposer`] and fed through the autograd tape once.
//!
//! ## Losses
//!
//! - [`TripletLoss`]: margin loss over mined triplets
//! - [`RkdDistance`]: pairwise distances regressed onto the reference
//! - [`RkdAngle`]: triplet angles regressed onto the reference
//! - [`HardDarkRank`]: listwise ranking of the reference's nearest neighbours

mod compose;
mod dark;
mod distance;
mod rkd;
mod triplet;


pub use compose::{ComposedLoss, LossComposer};
pub use dark::HardDarkRank;
pub use distance::{pdist, pdist_backward, DIST_EPS};
pub use rkd::{RkdAngle, RkdDistance};
pub use triplet::TripletLoss;

use crate::{Error, Result};
use ndarray::{Array2, ArrayView2};

/// Scalar loss value and its gradient w.r.t. the student embeddings
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f32,
    pub grad: Array2<f32>,
}

impl LossOutput {
    /// Zero loss with a zero gradient of the given shape
    pub fn zero(shape: (usize, usize)) -> Self {
        Self {
            value: 0.0,
            grad: Array2::zeros(shape),
        }
    }
}

/// One batch handed to an [`EmbeddingLoss`]
#[derive(Debug, Clone, Copy)]
pub struct LossInput<'a> {
    pub student: ArrayView2<'a, f32>,
    pub labels: &'a [usize],
    pub reference: Option<ArrayView2<'a, f32>>,
}

impl<'a> LossInput<'a> {
    pub fn new(
        student: ArrayView2<'a, f32>,
        labels: &'a [usize],
        reference: Option<ArrayView2<'a, f32>>,
    ) -> Result<Self> {
        if labels.len() != student.nrows() {
            return Err(Error::ShapeMismatch {
                expected: vec![student.nrows()],
                got: vec![labels.len()],
            });
        }
        if let Some(r) = reference {
            if r.nrows() != student.nrows() {
                return Err(Error::ShapeMismatch {
                    expected: vec![student.nrows(), r.ncols()],
                    got: vec![r.nrows(), r.ncols()],
                });
            }
        }
        Ok(Self {
            student,
            labels,
            reference,
        })
    }

    /// Reference embeddings, or a configuration error naming the loss
    pub fn require_reference(&self, loss: &str) -> Result<ArrayView2<'a, f32>> {
        self.reference.ok_or_else(|| {
            Error::Config(format!("{loss} loss requires teacher embeddings"))
        })
    }

    pub fn batch_size(&self) -> usize {
        self.student.nrows()
    }
}

/// A loss over one batch of embeddings
pub trait EmbeddingLoss {
    /// Name used in logs and step metrics
    fn name(&self) -> &'static str;

    /// Whether the loss needs reference (teacher) embeddings
    fn requires_reference(&self) -> bool {
        false
    }

    /// Value and gradient for one batch
    fn forward(&mut self, input: &LossInput<'_>) -> Result<LossOutput>;

    /// Value alone, for evaluation where the gradient would be discarded
    fn value(&mut self, input: &LossInput<'_>) -> Result<f32> {
        Ok(self.forward(input)?.value)
    }
}

/// Smooth L1 (Huber, beta = 1) of `x` and its derivative
pub(crate) fn smooth_l1(x: f32) -> (f32, f32) {
    if x.abs() < 1.0 {
        (0.5 * x * x, x)
    } else {
        (x.abs() - 0.5, x.signum())
    }
}
