//! Batch data structure

use crate::{Error, Result};
use ndarray::Array2;

/// A batch of feature rows and their class labels
#[derive(Debug, Clone)]
pub struct Batch {
    /// One input row per sample
    pub inputs: Array2<f32>,
    /// Class label of each row
    pub labels: Vec<usize>,
}

impl Batch {
    /// Create a new batch; row and label counts must agree
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![inputs.nrows()],
                got: vec![labels.len()],
            });
        }
        Ok(Self { inputs, labels })
    }

    /// Number of samples
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
