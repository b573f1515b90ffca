//! Embedding accumulator for one validation pass

use crate::{Error, Result};
use ndarray::{Array2, ArrayView2};

/// Embeddings and labels collected across the batches of a validation pass
///
/// Rows and labels stay positionally aligned. [`EvalAccumulator::drain`] hands
/// the contents out and leaves the accumulator empty.
#[derive(Debug, Clone, Default)]
pub struct EvalAccumulator {
    dim: Option<usize>,
    data: Vec<f32>,
    labels: Vec<usize>,
    max_rows: Option<usize>,
}

impl EvalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator that refuses to grow past `max_rows`
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            max_rows: Some(max_rows),
            ..Self::default()
        }
    }

    /// Append one batch
    pub fn append(&mut self, embeddings: ArrayView2<'_, f32>, labels: &[usize]) -> Result<()> {
        let (rows, cols) = embeddings.dim();
        if rows != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![rows],
                got: vec![labels.len()],
            });
        }
        if let Some(dim) = self.dim {
            if dim != cols {
                return Err(Error::ShapeMismatch {
                    expected: vec![rows, dim],
                    got: vec![rows, cols],
                });
            }
        }
        if let Some(max) = self.max_rows {
            if self.labels.len() + rows > max {
                return Err(Error::InvalidState(format!(
                    "evaluation accumulator full: {} + {rows} rows exceeds {max}",
                    self.labels.len()
                )));
            }
        }

        self.dim = Some(cols);
        self.data.extend(embeddings.iter().copied());
        self.labels.extend_from_slice(labels);
        Ok(())
    }

    /// Take everything collected so far and reset
    pub fn drain(&mut self) -> (Array2<f32>, Vec<usize>) {
        let dim = self.dim.take().unwrap_or(0);
        let labels = std::mem::take(&mut self.labels);
        let data = std::mem::take(&mut self.data);
        let embeddings = Array2::from_shape_vec((labels.len(), dim), data)
            .unwrap_or_else(|_| Array2::zeros((0, dim)));
        (embeddings, labels)
    }

    /// Discard everything collected so far
    pub fn reset(&mut self) {
        self.dim = None;
        self.data.clear();
        self.labels.clear();
    }

    /// Number of accumulated rows
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }
}
