//! Adam with decoupled weight decay

use super::{Adam, Optimizer};
use crate::Tensor;

/// Adam whose weight decay shrinks the parameters directly instead of
/// entering the gradient
///
/// `θ ← (1 - lr·λ)·θ - lr_t·m / (√v + ε)`. The adaptive part is a plain
/// [`Adam`] without L2; only parameters that received a gradient decay.
pub struct AdamW {
    adam: Adam,
    weight_decay: f32,
}

impl AdamW {
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self {
            adam: Adam::new(lr, beta1, beta2, epsilon),
            weight_decay,
        }
    }

    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [Tensor]) {
        let shrink = 1.0 - self.adam.lr() * self.weight_decay;
        if shrink != 1.0 {
            for param in params.iter_mut() {
                if param.requires_grad() && param.grad().is_some() {
                    let decayed = param.data() * shrink;
                    *param.data_mut() = decayed;
                }
            }
        }
        self.adam.step(params);
    }

    fn lr(&self) -> f32 {
        self.adam.lr()
    }

    fn set_lr(&mut self, lr: f32) {
        self.adam.set_lr(lr);
    }

    fn name(&self) -> &'static str {
        "adamw"
    }
}
