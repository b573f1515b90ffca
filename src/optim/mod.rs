//! Optimizers and learning-rate decay for the student network

mod adam;
mod adamw;
mod optimizer;
mod scheduler;
mod sgd;

pub use adam::Adam;
pub use adamw::AdamW;
pub use optimizer::Optimizer;
pub use scheduler::{LRScheduler, MultiStepLR};
pub use sgd::SGD;
