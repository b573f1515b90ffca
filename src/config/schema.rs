//! YAML schema definitions for declarative training configuration

use crate::mining::MiningStrategy;
use crate::model::{Backbone, Identity, Mlp};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Complete training specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSpec {
    /// Which network is being trained
    #[serde(default)]
    pub mode: TrainMode,

    /// Data configuration
    pub data: DataConfig,

    /// Student network and optional teacher
    pub model: ModelSpec,

    /// Optimizer configuration
    #[serde(default)]
    pub optimizer: OptimSpec,

    /// Loss terms and their weights
    #[serde(default)]
    pub loss: LossSpec,

    /// Training hyperparameters
    #[serde(default)]
    pub training: TrainingParams,
}

/// Training mode
///
/// `teacher` trains the embedding network directly against the metric and
/// relational losses. `student` is reserved and rejected at validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainMode {
    #[default]
    Teacher,
    Student,
}

impl fmt::Display for TrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrainMode::Teacher => "teacher",
            TrainMode::Student => "student",
        })
    }
}

/// Supported datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Cifar10,
    Cifar100,
}

impl Dataset {
    pub fn num_classes(&self) -> usize {
        match self {
            Dataset::Cifar10 => 10,
            Dataset::Cifar100 => 100,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dataset::Cifar10 => "cifar10",
            Dataset::Cifar100 => "cifar100",
        })
    }
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub dataset: Dataset,

    /// Training feature file (JSON)
    pub train: PathBuf,

    /// Optional validation feature file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<PathBuf>,

    /// Batch size
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Reshuffle the training set every epoch
    #[serde(default = "default_true")]
    pub shuffle: bool,
}

/// Backbone architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackboneSpec {
    /// Pass-through: embeds the raw features
    Identity { input_size: usize },

    /// Two-layer perceptron
    Mlp {
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        #[serde(default)]
        dropout: f32,
    },
}

impl BackboneSpec {
    pub fn input_size(&self) -> usize {
        match self {
            BackboneSpec::Identity { input_size } | BackboneSpec::Mlp { input_size, .. } => *input_size,
        }
    }

    /// Width of the features the backbone hands to the embedding head
    pub fn output_size(&self) -> usize {
        match self {
            BackboneSpec::Identity { input_size } => *input_size,
            BackboneSpec::Mlp { output_size, .. } => *output_size,
        }
    }

    /// Construct the backbone; `seed` drives dropout masks
    pub fn build(&self, seed: u64) -> Result<Box<dyn Backbone>> {
        Ok(match *self {
            BackboneSpec::Identity { input_size } => Box::new(Identity::new(input_size)),
            BackboneSpec::Mlp {
                input_size,
                hidden_size,
                output_size,
                dropout,
            } => {
                let mlp = Mlp::new(input_size, hidden_size, output_size);
                if dropout > 0.0 {
                    Box::new(mlp.with_dropout(dropout, seed)?)
                } else {
                    Box::new(mlp)
                }
            }
        })
    }
}

/// Student network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub backbone: BackboneSpec,

    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,

    /// L2-normalise embeddings
    #[serde(default = "default_true")]
    pub l2normalize: bool,

    /// Frozen reference network for the relational terms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<TeacherSpec>,
}

/// Frozen teacher network loaded from a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherSpec {
    /// Checkpoint file (JSON, YAML or SafeTensors)
    pub checkpoint: PathBuf,

    /// Prefix stripped from every parameter name
    #[serde(default = "default_prefix")]
    pub prefix: String,

    pub backbone: BackboneSpec,

    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,

    #[serde(default = "default_true")]
    pub l2normalize: bool,
}

/// Optimizer specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimSpec {
    /// Optimizer name: "adam" | "adamw" | "sgd"
    #[serde(default = "default_optimizer")]
    pub name: String,

    /// Learning rate
    #[serde(default = "default_lr")]
    pub lr: f32,

    #[serde(default = "default_weight_decay")]
    pub weight_decay: f32,

    /// SGD momentum
    #[serde(default = "default_momentum")]
    pub momentum: f32,

    /// Optimizer-specific parameters (beta1, beta2, eps)
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self {
            name: default_optimizer(),
            lr: default_lr(),
            weight_decay: default_weight_decay(),
            momentum: default_momentum(),
            params: HashMap::new(),
        }
    }
}

/// Loss terms and hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LossSpec {
    /// Miner for the primary metric term
    pub sample: MiningStrategy,
    /// Miner for the auxiliary triplet term
    pub triplet_sample: MiningStrategy,
    pub margin: f32,
    pub triplet_margin: f32,
    /// Weight of the primary metric term
    pub metric_ratio: f32,
    pub triplet_ratio: f32,
    pub dist_ratio: f32,
    pub angle_ratio: f32,
    pub dark_ratio: f32,
    pub dark_alpha: f32,
    pub dark_beta: f32,
    /// Knowledge-distillation temperature
    pub temperature: f32,
    /// Knowledge-distillation mixing weight
    pub alpha: f32,
}

impl Default for LossSpec {
    fn default() -> Self {
        Self {
            sample: MiningStrategy::All,
            triplet_sample: MiningStrategy::Distance,
            margin: 0.2,
            triplet_margin: 0.2,
            metric_ratio: 1.0,
            triplet_ratio: 0.0,
            dist_ratio: 0.0,
            angle_ratio: 0.0,
            dark_ratio: 0.0,
            dark_alpha: 2.0,
            dark_beta: 3.0,
            temperature: 10.0,
            alpha: 0.7,
        }
    }
}

impl LossSpec {
    /// Whether any configured term needs teacher embeddings
    pub fn needs_teacher(&self) -> bool {
        self.dist_ratio > 0.0 || self.angle_ratio > 0.0 || self.dark_ratio > 0.0
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Number of epochs
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Epochs after which the learning rate decays
    #[serde(default = "default_lr_decay_epochs")]
    pub lr_decay_epochs: Vec<usize>,

    /// Decay factor applied at each milestone
    #[serde(default = "default_lr_decay_gamma")]
    pub lr_decay_gamma: f32,

    /// Recall@K cutoffs; the first is the headline metric
    #[serde(default = "default_recall")]
    pub recall: Vec<usize>,

    #[serde(default)]
    pub seed: u64,

    /// Log training progress every N steps
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,

    /// Output directory for checkpoints
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Cap on the embeddings one validation pass may collect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_eval_rows: Option<usize>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            lr_decay_epochs: default_lr_decay_epochs(),
            lr_decay_gamma: default_lr_decay_gamma(),
            recall: default_recall(),
            seed: 0,
            log_interval: default_log_interval(),
            output_dir: default_output_dir(),
            max_eval_rows: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    64
}

fn default_embedding_size() -> usize {
    128
}

fn default_prefix() -> String {
    crate::io::DEFAULT_PREFIX.to_string()
}

fn default_optimizer() -> String {
    "adam".to_string()
}

fn default_lr() -> f32 {
    1e-5
}

fn default_weight_decay() -> f32 {
    1e-5
}

fn default_momentum() -> f32 {
    0.9
}

fn default_epochs() -> usize {
    40
}

fn default_lr_decay_epochs() -> Vec<usize> {
    vec![25, 30, 35]
}

fn default_lr_decay_gamma() -> f32 {
    0.5
}

fn default_recall() -> Vec<usize> {
    vec![1]
}

fn default_log_interval() -> usize {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let yaml = r#"
data:
  dataset: cifar10
  train: train.json

model:
  backbone:
    type: identity
    input_size: 16
"#;

        let spec: TrainSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.mode, TrainMode::Teacher);
        assert_eq!(spec.data.dataset, Dataset::Cifar10);
        assert_eq!(spec.data.batch_size, 64);
        assert!(spec.data.shuffle);
        assert_eq!(spec.model.embedding_size, 128);
        assert!(spec.model.l2normalize);
        assert!(spec.model.teacher.is_none());
        assert_eq!(spec.optimizer.name, "adam");
        assert_eq!(spec.optimizer.lr, 1e-5);
        assert_eq!(spec.optimizer.weight_decay, 1e-5);
        assert_eq!(spec.loss.sample, MiningStrategy::All);
        assert_eq!(spec.loss.triplet_sample, MiningStrategy::Distance);
        assert_eq!(spec.training.lr_decay_epochs, vec![25, 30, 35]);
        assert_eq!(spec.training.recall, vec![1]);
    }

    #[test]
    fn test_deserialize_full_config() {
        let yaml = r#"
mode: teacher

data:
  dataset: cifar100
  train: train.json
  val: val.json
  batch_size: 32
  shuffle: false

model:
  backbone:
    type: mlp
    input_size: 64
    hidden_size: 32
    output_size: 16
    dropout: 0.1
  embedding_size: 8
  l2normalize: false
  teacher:
    checkpoint: teacher.safetensors
    backbone:
      type: identity
      input_size: 64
    embedding_size: 16

optimizer:
  name: sgd
  lr: 0.01
  momentum: 0.5
  beta1: 0.8

loss:
  sample: semihard
  triplet_sample: hard
  triplet_ratio: 0.5
  dist_ratio: 1.0
  angle_ratio: 2.0

training:
  epochs: 3
  lr_decay_epochs: [1, 2]
  lr_decay_gamma: 0.1
  recall: [1, 2, 4]
  seed: 7
  output_dir: ./outputs
"#;

        let spec: TrainSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.data.dataset.num_classes(), 100);
        assert_eq!(spec.data.val, Some(PathBuf::from("val.json")));
        assert_eq!(spec.model.backbone.output_size(), 16);
        let teacher = spec.model.teacher.as_ref().unwrap();
        assert_eq!(teacher.prefix, "model.");
        assert!(teacher.l2normalize);
        assert_eq!(spec.optimizer.momentum, 0.5);
        assert_eq!(spec.optimizer.params.get("beta1"), Some(&serde_json::json!(0.8)));
        assert_eq!(spec.loss.sample, MiningStrategy::SemiHard);
        assert!(spec.loss.needs_teacher());
        assert_eq!(spec.training.recall, vec![1, 2, 4]);
    }

    #[test]
    fn test_unknown_dataset_rejected() {
        let yaml = r#"
data:
  dataset: imagenet
  train: train.json
model:
  backbone: {type: identity, input_size: 4}
"#;
        assert!(serde_yaml::from_str::<TrainSpec>(yaml).is_err());
    }

    #[test]
    fn test_unknown_sampler_rejected() {
        let yaml = r#"
data: {dataset: cifar10, train: train.json}
model:
  backbone: {type: identity, input_size: 4}
loss:
  sample: nearest
"#;
        assert!(serde_yaml::from_str::<TrainSpec>(yaml).is_err());
    }

    #[test]
    fn test_backbone_build() {
        let identity = BackboneSpec::Identity { input_size: 5 };
        assert_eq!(identity.build(0).unwrap().output_size(), 5);

        let mlp = BackboneSpec::Mlp {
            input_size: 5,
            hidden_size: 4,
            output_size: 3,
            dropout: 0.2,
        };
        let built = mlp.build(0).unwrap();
        assert_eq!(built.input_size(), 5);
        assert_eq!(built.output_size(), 3);

        let bad = BackboneSpec::Mlp {
            input_size: 5,
            hidden_size: 4,
            output_size: 3,
            dropout: 1.5,
        };
        assert!(bad.build(0).is_err());
    }

    #[test]
    fn test_default_training_params() {
        let params = TrainingParams::default();
        assert_eq!(params.epochs, 40);
        assert_eq!(params.lr_decay_gamma, 0.5);
        assert_eq!(params.log_interval, 10);
    }
}
