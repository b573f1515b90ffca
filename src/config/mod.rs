//! Declarative YAML configuration
//!
//! # Example
//!
//! ```yaml
//! data:
//!   dataset: cifar100
//!   train: features/train.json
//!   val: features/val.json
//!   batch_size: 64
//!
//! model:
//!   backbone: {type: mlp, input_size: 512, hidden_size: 512, output_size: 256}
//!   embedding_size: 64
//!   teacher:
//!     checkpoint: teacher.safetensors
//!     backbone: {type: identity, input_size: 512}
//!     embedding_size: 512
//!
//! optimizer:
//!   name: adam
//!   lr: 1e-5
//!
//! loss:
//!   sample: distance
//!   dist_ratio: 1.0
//!   angle_ratio: 2.0
//! ```

mod builder;
mod cli;
mod schema;
mod train;
mod validate;

#[cfg(test)]
mod tests;

pub use builder::{build_loss_composer, build_optimizer, build_scheduler, build_teacher, build_trainer};
pub use cli::{apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, TrainArgs, ValidateArgs};
pub use schema::{
    BackboneSpec, DataConfig, Dataset, LossSpec, ModelSpec, OptimSpec, TeacherSpec, TrainMode,
    TrainSpec, TrainingParams,
};
pub use train::{
    load_config, parse_config, run_training, train_from_yaml, TrainingReport, METRICS_FILE,
    STUDENT_CHECKPOINT,
};
pub use validate::{validate_config, validate_numbers, validate_teacher_terms, ValidationError};
