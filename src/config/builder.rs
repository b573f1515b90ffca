//! Build training components from configuration

use super::schema::{LossSpec, OptimSpec, TeacherSpec, TrainSpec};
use crate::error::{Error, Result};
use crate::io::load_state_dict;
use crate::model::EmbeddingNet;
use crate::optim::{Adam, AdamW, MultiStepLR, Optimizer, SGD};
use crate::relational::{HardDarkRank, LossComposer, RkdAngle, RkdDistance, TripletLoss};
use crate::train::RkdTrainer;
use std::sync::Arc;
use tracing::info;

/// Build optimizer from configuration
pub fn build_optimizer(spec: &OptimSpec) -> Result<Box<dyn Optimizer>> {
    let param = |key: &str, default: f32| {
        spec.params
            .get(key)
            .and_then(|v| v.as_f64())
            .map_or(default, |v| v as f32)
    };

    match spec.name.to_lowercase().as_str() {
        "sgd" => Ok(Box::new(
            SGD::new(spec.lr, spec.momentum).with_weight_decay(spec.weight_decay),
        )),
        "adam" => Ok(Box::new(
            Adam::new(spec.lr, param("beta1", 0.9), param("beta2", 0.999), param("eps", 1e-8))
                .with_weight_decay(spec.weight_decay),
        )),
        "adamw" => Ok(Box::new(AdamW::new(
            spec.lr,
            param("beta1", 0.9),
            param("beta2", 0.999),
            param("eps", 1e-8),
            spec.weight_decay,
        ))),
        name => Err(Error::Config(format!(
            "Unknown optimizer: {name}. Supported: sgd, adam, adamw"
        ))),
    }
}

/// Build the milestone learning-rate decay
pub fn build_scheduler(spec: &TrainSpec) -> MultiStepLR {
    MultiStepLR::new(
        spec.optimizer.lr,
        spec.training.lr_decay_epochs.clone(),
        spec.training.lr_decay_gamma,
    )
}

/// Build the weighted loss from configuration
///
/// Terms in order: the primary metric triplet term (`metric_ratio`, `sample`,
/// `margin`), the auxiliary triplet term (`triplet_ratio`, `triplet_sample`,
/// `triplet_margin`), then the teacher-guided distance, angle and dark-rank
/// terms. Zero-weighted terms are skipped.
pub fn build_loss_composer(spec: &LossSpec, seed: u64) -> Result<LossComposer> {
    let mut composer = LossComposer::new();
    composer.add(
        spec.metric_ratio,
        Box::new(TripletLoss::new(spec.margin, spec.sample.build(spec.margin, seed)).with_name("metric")),
    )?;
    composer.add(
        spec.triplet_ratio,
        Box::new(TripletLoss::new(
            spec.triplet_margin,
            spec.triplet_sample.build(spec.triplet_margin, seed.wrapping_add(1)),
        )),
    )?;
    composer.add(spec.dist_ratio, Box::new(RkdDistance::new()))?;
    composer.add(spec.angle_ratio, Box::new(RkdAngle::new()))?;
    composer.add(
        spec.dark_ratio,
        Box::new(HardDarkRank::new(spec.dark_alpha, spec.dark_beta)),
    )?;
    Ok(composer)
}

/// Build the teacher network and load its frozen weights
pub fn build_teacher(spec: &TeacherSpec, seed: u64) -> Result<EmbeddingNet> {
    let backbone = spec.backbone.build(seed)?;
    let mut teacher = EmbeddingNet::new(backbone, spec.embedding_size, spec.l2normalize, seed)?;
    teacher.freeze();

    let state = load_state_dict(&spec.checkpoint, &spec.prefix)?;
    teacher.load_state(&state)?;
    info!(
        checkpoint = %spec.checkpoint.display(),
        architecture = %teacher.describe(),
        parameters = teacher.num_parameters(),
        "loaded frozen teacher"
    );
    Ok(teacher)
}

/// Build the orchestrator for a validated configuration
pub fn build_trainer(spec: Arc<TrainSpec>) -> Result<RkdTrainer> {
    let seed = spec.training.seed;
    let student = spec.model.backbone.build(seed)?;
    let teacher = spec
        .model
        .teacher
        .as_ref()
        .map(|t| build_teacher(t, seed.wrapping_add(1)))
        .transpose()?;
    RkdTrainer::new(student, teacher, spec)
}
