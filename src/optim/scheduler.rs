//! Learning rate schedulers

use super::Optimizer;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (called once per epoch)
    fn step(&mut self);

    /// Apply the current learning rate to an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}

/// Step decay at fixed epoch milestones
///
/// `lr = base_lr * gamma^k` where `k` is the number of milestones already
/// reached. Milestones are epoch counts, so with milestones `[25, 30, 35]`
/// the first decay takes effect after the 25th call to [`LRScheduler::step`].
#[derive(Debug, Clone)]
pub struct MultiStepLR {
    base_lr: f32,
    milestones: Vec<usize>,
    gamma: f32,
    epoch: usize,
}

impl MultiStepLR {
    pub fn new(base_lr: f32, milestones: Vec<usize>, gamma: f32) -> Self {
        Self {
            base_lr,
            milestones,
            gamma,
            epoch: 0,
        }
    }

    /// Number of completed epochs
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }
}

impl LRScheduler for MultiStepLR {
    fn get_lr(&self) -> f32 {
        let reached = self.milestones.iter().filter(|&&m| m <= self.epoch).count();
        self.base_lr * self.gamma.powi(reached as i32)
    }

    fn step(&mut self) {
        self.epoch += 1;
    }
}
