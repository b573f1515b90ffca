//! Retrieval evaluation
//!
//! Embeddings from every validation batch are collected in an
//! [`EvalAccumulator`]; at the end of the pass they are drained and scored
//! with [`recall_at_k`].
//!
//! ```
//! use rkd::eval::recall_at_k;
//! use ndarray::array;
//!
//! let embeddings = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0]];
//! let recall = recall_at_k(embeddings.view(), &[0, 0, 1, 1], &[1, 2]).unwrap();
//! assert_eq!(recall.get(1), Some(1.0));
//! ```

mod accumulator;
mod recall;


pub use accumulator::EvalAccumulator;
pub use recall::{recall_at_k, RecallAtK};
