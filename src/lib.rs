//! # rkd: Relational Knowledge Distillation for embedding models
//!
//! rkd trains a compact embedding network so that the pairwise geometry of its
//! embeddings (distances, angles, neighbour rankings) follows a reference
//! structure, optionally guided by a frozen teacher network.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation for the student
//! - **mining**: Pair/triplet mining strategies over a batch
//! - **relational**: Triplet, RKD distance/angle and dark-rank losses
//! - **distill**: Temperature-scaled knowledge distillation loss
//! - **eval**: Recall@K and the validation accumulator
//! - **model**: Backbones and the embedding projection head
//! - **optim**: Optimizers (Adam, AdamW, SGD) and milestone LR decay
//! - **train**: The training orchestrator state machine
//! - **config**: Declarative YAML configuration and CLI
//! - **io**: Checkpoint loading and saving

pub mod autograd;
pub mod config;
pub mod data;
pub mod distill;
pub mod eval;
pub mod io;
pub mod mining;
pub mod model;
pub mod optim;
pub mod relational;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Tensor};
pub use error::{Error, Result};
