//! Feature extractors placed in front of the embedding head

use crate::autograd::{add_bias, matmul, mul_mask, relu, Context, Tensor};
use crate::{Error, Result};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// A freshly initialised parameter with its name and shape
#[derive(Debug, Clone)]
pub struct NamedParameter {
    pub name: String,
    pub shape: Vec<usize>,
    pub tensor: Tensor,
}

impl NamedParameter {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, tensor: Tensor) -> Self {
        Self {
            name: name.into(),
            shape,
            tensor,
        }
    }
}

/// Uniform(-1/√fan_in, 1/√fan_in) weight matrix and zero bias for a dense layer
pub(crate) fn dense_init(prefix: &str, fan_in: usize, fan_out: usize, rng: &mut StdRng) -> [NamedParameter; 2] {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    let weight: Vec<f32> = (0..fan_in * fan_out)
        .map(|_| rng.random_range(-bound..=bound))
        .collect();
    [
        NamedParameter::new(
            format!("{prefix}.weight"),
            vec![fan_in, fan_out],
            Tensor::from_vec(weight, true),
        ),
        NamedParameter::new(
            format!("{prefix}.bias"),
            vec![fan_out],
            Tensor::zeros(fan_out, true),
        ),
    ]
}

/// Network body producing `output_size` features per sample
///
/// Inputs and outputs are flat row-major `batch x width` tensors.
pub trait Backbone {
    /// Architecture description stored in checkpoints
    fn describe(&self) -> String;

    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    /// Fresh parameters, in the order `forward` expects them
    fn init_parameters(&self, rng: &mut StdRng) -> Vec<NamedParameter>;

    /// Forward pass over `batch` rows using `params`
    fn forward(&self, params: &[Tensor], inputs: &Tensor, batch: usize, ctx: &Context) -> Result<Tensor>;
}

fn check_input(backbone: &dyn Backbone, inputs: &Tensor, batch: usize) -> Result<()> {
    if inputs.len() != batch * backbone.input_size() {
        return Err(Error::ShapeMismatch {
            expected: vec![batch, backbone.input_size()],
            got: vec![inputs.len()],
        });
    }
    Ok(())
}

/// Passes precomputed features through unchanged
#[derive(Debug, Clone)]
pub struct Identity {
    size: usize,
}

impl Identity {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Backbone for Identity {
    fn describe(&self) -> String {
        format!("identity-{}", self.size)
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn init_parameters(&self, _rng: &mut StdRng) -> Vec<NamedParameter> {
        Vec::new()
    }

    fn forward(&self, _params: &[Tensor], inputs: &Tensor, batch: usize, _ctx: &Context) -> Result<Tensor> {
        check_input(self, inputs, batch)?;
        Ok(inputs.clone())
    }
}

/// Two dense layers with a ReLU and optional dropout between them
///
/// Dropout is only applied when the context is in training mode.
#[derive(Debug)]
pub struct Mlp {
    input_size: usize,
    hidden_size: usize,
    output_size: usize,
    dropout: f32,
    rng: RefCell<StdRng>,
}

impl Mlp {
    pub fn new(input_size: usize, hidden_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_size,
            output_size,
            dropout: 0.0,
            rng: RefCell::new(StdRng::seed_from_u64(0)),
        }
    }

    /// Dropout probability in `[0, 1)` and seed for the dropout masks
    pub fn with_dropout(mut self, p: f32, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(Error::Config(format!("dropout must be in [0, 1), got {p}")));
        }
        self.dropout = p;
        self.rng = RefCell::new(StdRng::seed_from_u64(seed));
        Ok(self)
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn dropout_mask(&self, len: usize) -> Array1<f32> {
        let keep = 1.0 - self.dropout;
        let mut rng = self.rng.borrow_mut();
        (0..len)
            .map(|_| if rng.random::<f32>() < keep { 1.0 / keep } else { 0.0 })
            .collect()
    }
}

impl Backbone for Mlp {
    fn describe(&self) -> String {
        format!(
            "mlp-{}-{}-{}",
            self.input_size, self.hidden_size, self.output_size
        )
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn init_parameters(&self, rng: &mut StdRng) -> Vec<NamedParameter> {
        let mut params = Vec::with_capacity(4);
        params.extend(dense_init("fc1", self.input_size, self.hidden_size, rng));
        params.extend(dense_init("fc2", self.hidden_size, self.output_size, rng));
        params
    }

    fn forward(&self, params: &[Tensor], inputs: &Tensor, batch: usize, ctx: &Context) -> Result<Tensor> {
        check_input(self, inputs, batch)?;
        let [w1, b1, w2, b2] = params else {
            return Err(Error::InvalidState(format!(
                "mlp expects 4 parameter tensors, got {}",
                params.len()
            )));
        };

        let h = matmul(inputs, w1, batch, self.input_size, self.hidden_size);
        let h = relu(&add_bias(&h, b1, batch, self.hidden_size));
        let h = if ctx.is_training() && self.dropout > 0.0 {
            mul_mask(&h, self.dropout_mask(h.len()))
        } else {
            h
        };
        let out = matmul(&h, w2, batch, self.hidden_size, self.output_size);
        Ok(add_bias(&out, b2, batch, self.output_size))
    }
}
