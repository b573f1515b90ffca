//! Weighted sum of embedding losses

use super::{EmbeddingLoss, LossInput, LossOutput};
use crate::{Error, Result};
use tracing::debug;

struct WeightedTerm {
    weight: f32,
    loss: Box<dyn EmbeddingLoss>,
}

/// Result of one composed loss evaluation
#[derive(Debug, Clone)]
pub struct ComposedLoss {
    /// Weighted total
    pub total: LossOutput,
    /// Unweighted value of each evaluated term
    pub terms: Vec<(&'static str, f32)>,
}

/// Sums weighted [`EmbeddingLoss`] terms into one objective
///
/// Terms registered with a zero weight are dropped and never evaluated.
#[derive(Default)]
pub struct LossComposer {
    terms: Vec<WeightedTerm>,
}

impl LossComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a term; a zero weight discards it
    pub fn add(&mut self, weight: f32, loss: Box<dyn EmbeddingLoss>) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::Config(format!(
                "{} loss weight must be finite and non-negative, got {weight}",
                loss.name()
            )));
        }
        if weight == 0.0 {
            debug!(term = loss.name(), "zero-weight loss term skipped");
            return Ok(());
        }
        self.terms.push(WeightedTerm { weight, loss });
        Ok(())
    }

    /// Builder form of [`LossComposer::add`]
    pub fn with_term(mut self, weight: f32, loss: Box<dyn EmbeddingLoss>) -> Result<Self> {
        self.add(weight, loss)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Names and weights of the active terms
    pub fn active_terms(&self) -> Vec<(&'static str, f32)> {
        self.terms.iter().map(|t| (t.loss.name(), t.weight)).collect()
    }

    /// Whether any active term needs teacher embeddings
    pub fn requires_reference(&self) -> bool {
        self.terms.iter().any(|t| t.loss.requires_reference())
    }

    /// Evaluate every active term on one batch
    pub fn compute(&mut self, input: &LossInput<'_>) -> Result<ComposedLoss> {
        let mut total = LossOutput::zero(input.student.dim());
        let mut terms = Vec::with_capacity(self.terms.len());

        for term in &mut self.terms {
            let out = term.loss.forward(input)?;
            if !out.value.is_finite() {
                return Err(Error::InvalidState(format!(
                    "{} loss is not finite",
                    term.loss.name()
                )));
            }
            total.value += term.weight * out.value;
            total.grad.scaled_add(term.weight, &out.grad);
            terms.push((term.loss.name(), out.value));
        }

        Ok(ComposedLoss { total, terms })
    }

    /// Weighted total without gradients
    pub fn evaluate(&mut self, input: &LossInput<'_>) -> Result<f32> {
        let mut total = 0.0;
        for term in &mut self.terms {
            let value = term.loss.value(input)?;
            if !value.is_finite() {
                return Err(Error::InvalidState(format!(
                    "{} loss is not finite",
                    term.loss.name()
                )));
            }
            total += term.weight * value;
        }
        Ok(total)
    }
}
