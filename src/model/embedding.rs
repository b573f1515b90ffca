//! Backbone plus linear embedding head

use super::backbone::{dense_init, Backbone, NamedParameter};
use crate::autograd::{add_bias, l2_normalize_rows, matmul, Context, Tensor};
use crate::io::{Checkpoint, CheckpointMetadata, Parameter, StateDict};
use crate::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Embedding network: `normalize?(backbone(x) · W + b)`
///
/// Parameters are kept in one flat list so an optimizer can step them
/// together: backbone parameters (named `backbone.*`) followed by
/// `head.weight` and `head.bias`.
pub struct EmbeddingNet {
    backbone: Box<dyn Backbone>,
    embedding_size: usize,
    normalize: bool,
    names: Vec<String>,
    shapes: Vec<Vec<usize>>,
    params: Vec<Tensor>,
    backbone_params: usize,
}

impl EmbeddingNet {
    pub fn new(backbone: Box<dyn Backbone>, embedding_size: usize, normalize: bool, seed: u64) -> Result<Self> {
        if embedding_size == 0 {
            return Err(Error::Config("embedding size must be positive".to_string()));
        }
        let mut rng = StdRng::seed_from_u64(seed);

        let mut named: Vec<NamedParameter> = backbone
            .init_parameters(&mut rng)
            .into_iter()
            .map(|p| NamedParameter::new(format!("backbone.{}", p.name), p.shape, p.tensor))
            .collect();
        let backbone_params = named.len();
        named.extend(dense_init("head", backbone.output_size(), embedding_size, &mut rng));

        let mut names = Vec::with_capacity(named.len());
        let mut shapes = Vec::with_capacity(named.len());
        let mut params = Vec::with_capacity(named.len());
        for p in named {
            names.push(p.name);
            shapes.push(p.shape);
            params.push(p.tensor);
        }

        Ok(Self {
            backbone,
            embedding_size,
            normalize,
            names,
            shapes,
            params,
            backbone_params,
        })
    }

    /// Forward a flat `batch x input_size` tensor to `batch x embedding_size`
    pub fn forward(&self, inputs: &Tensor, batch: usize, ctx: &Context) -> Result<Tensor> {
        let (backbone_params, head) = self.params.split_at(self.backbone_params);
        let [weight, bias] = head else {
            return Err(Error::InvalidState("embedding head parameters missing".to_string()));
        };

        let features = self.backbone.forward(backbone_params, inputs, batch, ctx)?;
        let out = self.backbone.output_size();
        let projected = add_bias(
            &matmul(&features, weight, batch, out, self.embedding_size),
            bias,
            batch,
            self.embedding_size,
        );

        Ok(if self.normalize {
            l2_normalize_rows(&projected, batch, self.embedding_size)
        } else {
            projected
        })
    }

    /// Embed a feature matrix without recording gradients
    pub fn embed(&self, inputs: &Array2<f32>, ctx: &Context) -> Result<Array2<f32>> {
        let batch = inputs.nrows();
        if inputs.ncols() != self.input_size() {
            return Err(Error::ShapeMismatch {
                expected: vec![batch, self.input_size()],
                got: vec![batch, inputs.ncols()],
            });
        }
        let out = self.forward(&Tensor::from_array2(inputs, false), batch, ctx)?;
        Ok(out.view2(batch, self.embedding_size)?.to_owned())
    }

    pub fn input_size(&self) -> usize {
        self.backbone.input_size()
    }

    pub fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn describe(&self) -> String {
        format!("{}+head-{}", self.backbone.describe(), self.embedding_size)
    }

    pub fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    pub fn named_parameters(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.names.iter().map(String::as_str).zip(&self.params)
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.params.iter().map(Tensor::len).sum()
    }

    /// Disable gradient tracking on every parameter
    pub fn freeze(&mut self) {
        for p in &mut self.params {
            p.set_requires_grad(false);
        }
    }

    /// True when no parameter tracks gradients
    pub fn is_frozen(&self) -> bool {
        self.params.iter().all(|p| !p.requires_grad())
    }

    pub fn zero_grad(&self) {
        for p in &self.params {
            p.zero_grad();
        }
    }

    /// Overwrite every parameter from a state dict keyed by parameter name
    ///
    /// Every parameter must be present with a matching element count; extra
    /// entries in `state` are ignored.
    pub fn load_state(&mut self, state: &StateDict) -> Result<()> {
        let missing: Vec<&str> = self
            .names
            .iter()
            .filter(|n| !state.contains_key(n.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Checkpoint(format!(
                "missing parameters for {}: {missing:?}",
                self.describe()
            )));
        }

        for ((name, shape), tensor) in self.names.iter().zip(&self.shapes).zip(&mut self.params) {
            let source = &state[name.as_str()];
            if source.numel() != tensor.len() {
                return Err(Error::ShapeMismatch {
                    expected: shape.clone(),
                    got: source.shape.clone(),
                });
            }
            tensor
                .data_mut()
                .iter_mut()
                .zip(&source.data)
                .for_each(|(dst, &src)| *dst = src);
            tensor.zero_grad();
        }

        let unused = state.len().saturating_sub(self.names.len());
        if unused > 0 {
            debug!(unused, "state dict entries not used by the network");
        }
        Ok(())
    }

    /// Snapshot of every parameter as a checkpoint
    pub fn to_checkpoint(&self, name: &str) -> Result<Checkpoint> {
        let parameters = self
            .names
            .iter()
            .zip(&self.shapes)
            .zip(&self.params)
            .map(|((n, shape), t)| Parameter::new(n.clone(), shape.clone(), t.data().to_vec()))
            .collect::<Result<Vec<_>>>()?;
        let metadata = CheckpointMetadata::new(name, self.describe())
            .with_custom("embedding_size", self.embedding_size.to_string())
            .with_custom("l2normalize", self.normalize.to_string());
        Ok(Checkpoint::new(metadata, parameters))
    }
}

impl std::fmt::Debug for EmbeddingNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingNet")
            .field("architecture", &self.describe())
            .field("normalize", &self.normalize)
            .field("parameters", &self.num_parameters())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
