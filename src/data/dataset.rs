//! Labelled feature matrix

use crate::train::Batch;
use crate::{Error, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct FeatureFile {
    features: Vec<Vec<f32>>,
    labels: Vec<usize>,
}

/// Labelled feature rows
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDataset {
    features: Array2<f32>,
    labels: Vec<usize>,
}

impl FeatureDataset {
    pub fn new(features: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![features.nrows()],
                got: vec![labels.len()],
            });
        }
        Ok(Self { features, labels })
    }

    /// Load a dataset from a JSON feature file
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let file: FeatureFile = serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))?;

        if file.features.is_empty() {
            return Err(Error::Config(format!("{} contains no samples", path.display())));
        }
        let dim = file.features[0].len();
        if let Some(bad) = file.features.iter().find(|row| row.len() != dim) {
            return Err(Error::ShapeMismatch {
                expected: vec![dim],
                got: vec![bad.len()],
            });
        }

        let rows = file.features.len();
        let flat: Vec<f32> = file.features.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((rows, dim), flat)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        debug!(path = %path.display(), rows, dim, "loaded feature dataset");
        Self::new(features, file.labels)
    }

    /// Write the dataset as a JSON feature file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = FeatureFile {
            features: self.features.outer_iter().map(|row| row.to_vec()).collect(),
            labels: self.labels.clone(),
        };
        let json = serde_json::to_string(&file).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Clustered samples around random class centres
    ///
    /// Each class centre is drawn uniformly from `[-1, 1]^dim`; samples add
    /// uniform noise of half-width `spread`. Rows are ordered class by class.
    pub fn synthetic_clusters(
        num_classes: usize,
        per_class: usize,
        dim: usize,
        spread: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let centres = Array2::<f32>::from_shape_fn((num_classes, dim), |_| rng.random_range(-1.0..1.0));

        let rows = num_classes * per_class;
        let labels: Vec<usize> = (0..rows).map(|i| i / per_class.max(1)).collect();
        let features = Array2::<f32>::from_shape_fn((rows, dim), |(i, j)| {
            let noise = if spread > 0.0 {
                rng.random_range(-spread..spread)
            } else {
                0.0
            };
            centres[[labels[i], j]] + noise
        });

        Self { features, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature width
    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    /// Number of distinct labels
    pub fn num_classes(&self) -> usize {
        self.labels.iter().collect::<BTreeSet<_>>().len()
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Gather the given rows into a batch
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(Error::Config(format!(
                "sample index {bad} out of range for {} samples",
                self.len()
            )));
        }
        let inputs = self.features.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        Batch::new(inputs, labels)
    }
}
