//! Training orchestration
//!
//! [`RkdTrainer`] owns the student (and optional frozen teacher), the loss
//! composition, the optimizer and the validation accumulator. The caller
//! drives it batch by batch:
//!
//! ```
//! use rkd::config::TrainSpec;
//! use rkd::data::FeatureDataset;
//! use rkd::model::Identity;
//! use rkd::train::{Phase, RkdTrainer};
//! use std::sync::Arc;
//!
//! let spec: TrainSpec = serde_yaml::from_str(r#"
//! data: {dataset: cifar10, train: train.json}
//! model:
//!   backbone: {type: identity, input_size: 4}
//!   embedding_size: 2
//! optimizer: {lr: 0.01}
//! "#).unwrap();
//!
//! let data = FeatureDataset::synthetic_clusters(2, 4, 4, 0.1, 0);
//! let batch = data.batch(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
//!
//! let mut trainer = RkdTrainer::new(Box::new(Identity::new(4)), None, Arc::new(spec)).unwrap();
//! trainer.training_step(&batch).unwrap();
//! trainer.validation_step(&batch).unwrap();
//! let summary = trainer.validation_end().unwrap();
//! assert_eq!(trainer.phase(), Phase::ValidationAggregated);
//! assert!(summary.recall >= 0.0);
//! ```

mod batch;
mod metrics;
mod phase;
mod trainer;


pub use batch::Batch;
pub use metrics::MetricsTracker;
pub use phase::{ForwardMode, Phase};
pub use trainer::{RkdTrainer, StepOutput, ValidationSummary};
