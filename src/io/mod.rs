//! Checkpoint I/O
//!
//! Checkpoints are flat lists of named, shaped `f32` tensors stored as JSON,
//! YAML, or SafeTensors. Teacher weights are read with
//! [`load_state_dict`], which strips the wrapper prefix (`model.` by default)
//! from every name and fails if nothing matches.

mod checkpoint;
mod format;
mod load;
mod save;


pub use checkpoint::{Checkpoint, CheckpointMetadata, Parameter, StateDict};
pub use format::{CheckpointFormat, SaveConfig};
pub use load::{load_checkpoint, load_state_dict};
pub use save::save_checkpoint;

/// Prefix the training wrapper puts in front of every parameter name
pub const DEFAULT_PREFIX: &str = "model.";
