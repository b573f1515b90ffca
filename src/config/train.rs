//! Single-command training from YAML configuration

use super::builder::build_trainer;
use super::schema::TrainSpec;
use super::validate::validate_config;
use crate::data::{BatchLoader, FeatureDataset};
use crate::error::{Error, Result};
use crate::io::{save_checkpoint, CheckpointFormat, SaveConfig};
use crate::train::{MetricsTracker, RkdTrainer};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// File name of the trained student inside `output_dir`
pub const STUDENT_CHECKPOINT: &str = "student.safetensors";
/// File name of the metric history inside `output_dir`
pub const METRICS_FILE: &str = "metrics.json";

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub steps: usize,
    /// Mean training loss of the last epoch
    pub final_loss: Option<f32>,
    /// Best headline recall over all validation passes
    pub best_recall: Option<f32>,
    pub final_lr: f32,
    pub checkpoint: PathBuf,
    pub metrics: PathBuf,
}

/// Train a student from a YAML configuration file
///
/// Loads and validates the config, then hands it to [`run_training`].
///
/// # Example
///
/// ```no_run
/// use rkd::config::train_from_yaml;
///
/// let report = train_from_yaml("rkd.yaml")?;
/// println!("best recall: {:?}", report.best_recall);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn train_from_yaml<P: AsRef<Path>>(config_path: P) -> Result<TrainingReport> {
    let spec = load_config(config_path)?;
    run_training(spec)
}

/// Run the epoch loop for an already validated configuration
///
/// Each epoch trains on every batch of `data.train`, runs one validation pass
/// over `data.val` when present, then applies the milestone learning-rate
/// decay. The trained student and the metric history are written to
/// `training.output_dir`.
pub fn run_training(spec: TrainSpec) -> Result<TrainingReport> {
    let train = FeatureDataset::from_json(&spec.data.train)?;
    check_dataset(&spec, &train, "training")?;
    let val = spec
        .data
        .val
        .as_ref()
        .map(FeatureDataset::from_json)
        .transpose()?;
    if let Some(val) = &val {
        check_dataset(&spec, val, "validation")?;
    }

    let spec = Arc::new(spec);
    let mut trainer = build_trainer(Arc::clone(&spec))?;
    let seed = spec.training.seed;
    let mut train_loader = BatchLoader::new(&train, spec.data.batch_size, spec.data.shuffle, seed)?;

    info!(
        dataset = %spec.data.dataset,
        samples = train.len(),
        batches = train_loader.num_batches(),
        epochs = spec.training.epochs,
        "starting training"
    );

    for _ in 0..spec.training.epochs {
        train_loader.start_epoch();
        for batch in &mut train_loader {
            trainer.training_step(&batch?)?;
        }
        if let Some(val) = &val {
            run_validation(&mut trainer, val, spec.data.batch_size)?;
        }
        trainer.epoch_end()?;
    }
    trainer.finish();

    save_outputs(&trainer, &spec.training.output_dir)
}

/// Load training spec from YAML file (without running training)
///
/// Useful for testing config parsing and validation separately from training.
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<TrainSpec> {
    let spec = parse_config(config_path)?;
    validate_config(&spec)?;
    Ok(spec)
}

/// Read and parse a YAML config without validating it
pub fn parse_config<P: AsRef<Path>>(config_path: P) -> Result<TrainSpec> {
    let path = config_path.as_ref();
    let yaml_content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    serde_yaml::from_str(&yaml_content)
        .map_err(|e| Error::Config(format!("Failed to parse YAML config: {e}")))
}

fn check_dataset(spec: &TrainSpec, data: &FeatureDataset, split: &str) -> Result<()> {
    let width = spec.model.backbone.input_size();
    if data.dim() != width && !data.is_empty() {
        return Err(Error::ShapeMismatch {
            expected: vec![data.len(), width],
            got: vec![data.len(), data.dim()],
        });
    }
    let classes = spec.data.dataset.num_classes();
    if let Some(&label) = data.labels().iter().find(|&&l| l >= classes) {
        return Err(Error::Config(format!(
            "{split} label {label} out of range for {} ({classes} classes)",
            spec.data.dataset
        )));
    }
    Ok(())
}

fn run_validation(trainer: &mut RkdTrainer, val: &FeatureDataset, batch_size: usize) -> Result<()> {
    let mut loader = BatchLoader::new(val, batch_size, false, 0)?;
    loader.start_epoch();
    for batch in loader {
        trainer.validation_step(&batch?)?;
    }
    trainer.validation_end()?;
    Ok(())
}

fn save_outputs(trainer: &RkdTrainer, output_dir: &Path) -> Result<TrainingReport> {
    fs::create_dir_all(output_dir)?;

    let checkpoint_path = output_dir.join(STUDENT_CHECKPOINT);
    let checkpoint = trainer.student().to_checkpoint("student")?;
    save_checkpoint(
        &checkpoint,
        &checkpoint_path,
        &SaveConfig::new(CheckpointFormat::SafeTensors),
    )?;

    let metrics_path = output_dir.join(METRICS_FILE);
    let metrics: &MetricsTracker = &trainer.metrics;
    let json = serde_json::to_string_pretty(metrics)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    fs::write(&metrics_path, json)?;

    info!(
        checkpoint = %checkpoint_path.display(),
        metrics = %metrics_path.display(),
        "saved training outputs"
    );

    Ok(TrainingReport {
        epochs: metrics.epoch,
        steps: metrics.steps,
        final_loss: metrics.losses.last().copied(),
        best_recall: metrics.best_recall(),
        final_lr: trainer.lr(),
        checkpoint: checkpoint_path,
        metrics: metrics_path,
    })
}
