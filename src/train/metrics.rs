//! Training and validation metric history

use serde::{Deserialize, Serialize};

/// Tracks metrics across steps and epochs
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsTracker {
    /// Mean training loss per epoch
    pub losses: Vec<f32>,

    /// Mean validation loss per validation pass
    pub val_losses: Vec<f32>,

    /// Headline Recall@K per validation pass
    pub recalls: Vec<f32>,

    /// Learning rate in effect during each epoch
    pub learning_rates: Vec<f32>,

    /// Training step count
    pub steps: usize,

    /// Completed epochs
    pub epoch: usize,

    #[serde(skip)]
    epoch_loss_sum: f32,
    #[serde(skip)]
    epoch_batches: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one training step
    pub fn record_step(&mut self, loss: f32) {
        self.steps += 1;
        self.epoch_loss_sum += loss;
        self.epoch_batches += 1;
    }

    /// Mean loss of the steps recorded since the last epoch boundary
    pub fn epoch_average(&self) -> f32 {
        if self.epoch_batches == 0 {
            0.0
        } else {
            self.epoch_loss_sum / self.epoch_batches as f32
        }
    }

    /// Close the current epoch with the learning rate it ran at
    pub fn end_epoch(&mut self, lr: f32) -> f32 {
        let avg = self.epoch_average();
        self.record_epoch(avg, lr);
        self.epoch_loss_sum = 0.0;
        self.epoch_batches = 0;
        avg
    }

    /// Record an epoch's training metrics
    pub fn record_epoch(&mut self, loss: f32, lr: f32) {
        self.losses.push(loss);
        self.learning_rates.push(lr);
        self.epoch += 1;
    }

    /// Record one aggregated validation pass
    pub fn record_validation(&mut self, val_loss: f32, recall: f32) {
        self.val_losses.push(val_loss);
        self.recalls.push(recall);
    }

    pub fn best_val_loss(&self) -> Option<f32> {
        self.val_losses.iter().copied().min_by(f32::total_cmp)
    }

    pub fn best_recall(&self) -> Option<f32> {
        self.recalls.iter().copied().max_by(f32::total_cmp)
    }

    /// Get average loss over last N epochs
    pub fn avg_loss(&self, n: usize) -> f32 {
        if self.losses.is_empty() {
            return 0.0;
        }

        let start = self.losses.len().saturating_sub(n);
        let window = &self.losses[start..];
        window.iter().sum::<f32>() / window.len() as f32
    }

    pub fn best_loss(&self) -> Option<f32> {
        self.losses.iter().copied().min_by(f32::total_cmp)
    }
}
