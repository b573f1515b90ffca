//! In-memory checkpoint: named parameter tensors plus metadata

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Checkpoint metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Network identifier
    pub name: String,

    /// Architecture description (e.g. "mlp-128")
    pub architecture: String,

    /// Format version
    pub version: String,

    /// Free-form fields
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl CheckpointMetadata {
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            custom: HashMap::new(),
        }
    }

    /// Add custom metadata field
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// One named parameter, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::ShapeMismatch {
                expected: shape,
                got: vec![data.len()],
            });
        }
        Ok(Self {
            name: name.into(),
            shape,
            data,
        })
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

/// Parameters keyed by their name after prefix stripping
pub type StateDict = BTreeMap<String, Parameter>;

/// Serializable checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub metadata: CheckpointMetadata,
    pub parameters: Vec<Parameter>,
}

impl Checkpoint {
    pub fn new(metadata: CheckpointMetadata, parameters: Vec<Parameter>) -> Self {
        Self {
            metadata,
            parameters,
        }
    }

    /// Get parameter by name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Total number of scalar values
    pub fn numel(&self) -> usize {
        self.parameters.iter().map(Parameter::numel).sum()
    }

    /// Copy of this checkpoint with `prefix` prepended to every name
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        for p in &mut self.parameters {
            p.name = format!("{prefix}{}", p.name);
        }
        self
    }

    /// Parameters whose name starts with `prefix`, keyed by the remainder
    ///
    /// Names without the prefix are dropped. An empty prefix keeps every name.
    ///
    /// # Errors
    ///
    /// `Error::Checkpoint` when no name carries the prefix.
    pub fn strip_prefix(&self, prefix: &str) -> Result<StateDict> {
        let state: StateDict = self
            .parameters
            .iter()
            .filter_map(|p| {
                p.name.strip_prefix(prefix).map(|rest| {
                    let mut stripped = p.clone();
                    stripped.name = rest.to_string();
                    (stripped.name.clone(), stripped)
                })
            })
            .collect();

        if state.is_empty() {
            let sample: Vec<&str> = self
                .parameters
                .iter()
                .take(3)
                .map(|p| p.name.as_str())
                .collect();
            return Err(Error::Checkpoint(format!(
                "no parameter name starts with prefix {prefix:?} ({} parameters, e.g. {sample:?})",
                self.parameters.len()
            )));
        }
        Ok(state)
    }
}
