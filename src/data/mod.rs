//! Feature datasets and mini-batch iteration
//!
//! Images are out of scope for this crate: a dataset is a matrix of
//! pre-extracted feature rows with one class label per row, stored as JSON
//! (`{"features": [[...], ...], "labels": [...]}`).

mod dataset;
mod loader;


pub use dataset::FeatureDataset;
pub use loader::BatchLoader;
