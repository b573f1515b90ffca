//! Config loading across schema, validation and builders

use super::*;
use crate::io::{save_checkpoint, CheckpointFormat, SaveConfig};
use crate::mining::MiningStrategy;
use crate::model::{EmbeddingNet, Identity};
use crate::Error;
use proptest::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn minimal_spec() -> TrainSpec {
    serde_yaml::from_str(
        "data: {dataset: cifar100, train: t.json}\nmodel:\n  backbone: {type: identity, input_size: 4}\n",
    )
    .unwrap()
}

#[test]
fn test_end_to_end_config_loading() {
    let dir = TempDir::new().unwrap();
    let train = write(dir.path(), "train.json", r#"{"features": [[0.0, 1.0, 2.0]], "labels": [0]}"#);

    let source = EmbeddingNet::new(Box::new(Identity::new(3)), 4, true, 1).unwrap();
    let checkpoint_path = dir.path().join("teacher.safetensors");
    save_checkpoint(
        &source.to_checkpoint("teacher").unwrap().with_prefix("model."),
        &checkpoint_path,
        &SaveConfig::new(CheckpointFormat::SafeTensors),
    )
    .unwrap();

    let yaml = format!(
        r#"
mode: teacher
data:
  dataset: cifar10
  train: {train}
  batch_size: 16
model:
  backbone:
    type: mlp
    input_size: 3
    hidden_size: 8
    output_size: 6
  embedding_size: 5
  teacher:
    checkpoint: {checkpoint}
    backbone: {{type: identity, input_size: 3}}
    embedding_size: 4
optimizer:
  name: adamw
  lr: 0.0001
  beta1: 0.8
loss:
  sample: semihard
  dist_ratio: 1.0
  angle_ratio: 2.0
training:
  epochs: 3
"#,
        train = train.display(),
        checkpoint = checkpoint_path.display()
    );
    let config = write(dir.path(), "rkd.yaml", &yaml);

    let spec = load_config(&config).unwrap();
    assert_eq!(spec.data.batch_size, 16);
    assert_eq!(spec.optimizer.name, "adamw");
    assert_eq!(spec.loss.sample, MiningStrategy::SemiHard);
    assert_eq!(spec.training.epochs, 3);

    let trainer = build_trainer(Arc::new(spec)).unwrap();
    assert!(trainer.teacher_frozen());
    assert_eq!(trainer.student().embedding_size(), 5);
    assert_eq!(trainer.teacher().unwrap().embedding_size(), 4);
}

#[test]
fn test_minimal_config_defaults() {
    let spec = minimal_spec();
    assert_eq!(spec.mode, TrainMode::Teacher);
    assert_eq!(spec.data.batch_size, 64);
    assert_eq!(spec.model.embedding_size, 128);
    assert_eq!(spec.optimizer.lr, 1e-5);
    assert_eq!(spec.training.lr_decay_epochs, vec![25, 30, 35]);
    assert!(validate_numbers(&spec).is_ok());
}

#[test]
fn test_relational_terms_without_teacher_fail_on_load() {
    let dir = TempDir::new().unwrap();
    let train = write(dir.path(), "train.json", r#"{"features": [[0.0]], "labels": [0]}"#);
    let yaml = format!(
        "data: {{dataset: cifar10, train: {}}}\nmodel:\n  backbone: {{type: identity, input_size: 1}}\nloss:\n  dark_ratio: 1.0\n",
        train.display()
    );
    let err = load_config(write(dir.path(), "rkd.yaml", &yaml)).unwrap_err();
    match err {
        Error::Config(msg) => assert!(msg.contains("dark"), "{msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_student_mode_fails_on_load() {
    let dir = TempDir::new().unwrap();
    let train = write(dir.path(), "train.json", r#"{"features": [[0.0]], "labels": [0]}"#);
    let yaml = format!(
        "mode: student\ndata: {{dataset: cifar10, train: {}}}\nmodel:\n  backbone: {{type: identity, input_size: 1}}\n",
        train.display()
    );
    assert!(matches!(
        load_config(write(dir.path(), "rkd.yaml", &yaml)),
        Err(Error::Config(_))
    ));
}

proptest! {
    #[test]
    fn prop_positive_lr_and_batch_accepted(lr in 1e-8f32..10.0, batch in 1usize..4096) {
        let mut spec = minimal_spec();
        spec.optimizer.lr = lr;
        spec.data.batch_size = batch;
        prop_assert!(validate_numbers(&spec).is_ok());
    }

    #[test]
    fn prop_non_positive_lr_rejected(lr in -10.0f32..=0.0) {
        let mut spec = minimal_spec();
        spec.optimizer.lr = lr;
        prop_assert!(matches!(
            validate_numbers(&spec),
            Err(ValidationError::InvalidLearningRate(_))
        ));
    }

    #[test]
    fn prop_unsorted_milestones_rejected(a in 1usize..50, b in 1usize..50) {
        prop_assume!(a >= b);
        let mut spec = minimal_spec();
        spec.training.lr_decay_epochs = vec![a, b];
        prop_assert!(matches!(
            validate_numbers(&spec),
            Err(ValidationError::InvalidMilestones(_))
        ));
    }

    #[test]
    fn prop_alpha_outside_unit_interval_rejected(alpha in prop_oneof![-5.0f32..-1e-3, 1.001f32..5.0]) {
        let mut spec = minimal_spec();
        spec.loss.alpha = alpha;
        prop_assert!(validate_numbers(&spec).is_err());
    }
}
