//! Embedding networks
//!
//! A [`Backbone`] turns raw inputs into features; [`EmbeddingNet`] adds the
//! linear projection to the embedding size and optional L2 normalisation,
//! and owns every parameter of the combined network.

mod backbone;
mod embedding;

#[cfg(test)]
mod tests;

pub use backbone::{Backbone, Identity, Mlp, NamedParameter};
pub use embedding::EmbeddingNet;
