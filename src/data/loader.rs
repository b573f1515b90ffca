//! Mini-batch iteration with seeded shuffling

use super::FeatureDataset;
use crate::train::Batch;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Iterates a [`FeatureDataset`] in batches
///
/// Call [`BatchLoader::start_epoch`] before each pass; with shuffling enabled
/// it draws a new order from the loader's own seeded RNG, so two loaders built
/// with the same seed produce the same sequence of epochs.
pub struct BatchLoader<'a> {
    dataset: &'a FeatureDataset,
    batch_size: usize,
    shuffle: bool,
    indices: Vec<usize>,
    position: usize,
    rng: StdRng,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a FeatureDataset, batch_size: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch size must be positive".to_string()));
        }
        Ok(Self {
            dataset,
            batch_size,
            shuffle,
            indices: (0..dataset.len()).collect(),
            position: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Batches per epoch, counting a final partial batch
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rewind, reshuffling when enabled
    pub fn start_epoch(&mut self) {
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
        self.position = 0;
    }
}

impl Iterator for BatchLoader<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.indices.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.indices.len());
        let batch = self.dataset.batch(&self.indices[self.position..end]);
        self.position = end;
        Some(batch)
    }
}
