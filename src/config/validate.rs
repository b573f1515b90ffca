//! Configuration validation

use super::schema::{BackboneSpec, TrainMode, TrainSpec};
use crate::Error;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Training mode '{0}' is not implemented")]
    UnsupportedMode(TrainMode),

    #[error("Training data path does not exist: {0}")]
    TrainDataNotFound(String),

    #[error("Validation data path does not exist: {0}")]
    ValDataNotFound(String),

    #[error("Teacher checkpoint does not exist: {0}")]
    TeacherCheckpointNotFound(String),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid optimizer: {0} (must be one of: adam, adamw, sgd)")]
    InvalidOptimizer(String),

    #[error("Invalid {name}: {value} (must be finite and >= 0)")]
    NegativeValue { name: &'static str, value: f32 },

    #[error("Invalid temperature: {0} (must be > 0.0)")]
    InvalidTemperature(f32),

    #[error("Invalid alpha: {0} (must be in [0, 1])")]
    InvalidAlpha(f32),

    #[error("Invalid {0}: must be > 0")]
    ZeroSize(&'static str),

    #[error("Invalid recall cutoffs {0:?}: need at least one, all > 0")]
    InvalidRecall(Vec<usize>),

    #[error("Invalid LR decay milestones {0:?}: must be strictly increasing")]
    InvalidMilestones(Vec<usize>),

    #[error("Invalid LR decay gamma: {0} (must be in (0, 1])")]
    InvalidGamma(f32),

    #[error("Invalid dropout: {0} (must be in [0, 1))")]
    InvalidDropout(f32),

    #[error("Loss term '{0}' needs a teacher network")]
    MissingTeacher(&'static str),

    #[error("Teacher input size {teacher} does not match student input size {student}")]
    InputSizeMismatch { student: usize, teacher: usize },
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Config(format!("Invalid config: {e}"))
    }
}

/// Validate a training specification
///
/// Checks:
/// - File paths exist
/// - Numeric values are in valid ranges
/// - Teacher-dependent loss terms have a teacher
pub fn validate_config(spec: &TrainSpec) -> Result<(), ValidationError> {
    if spec.mode == TrainMode::Student {
        return Err(ValidationError::UnsupportedMode(spec.mode));
    }

    validate_numbers(spec)?;
    validate_teacher_terms(spec)?;
    validate_paths(spec)?;
    Ok(())
}

/// Teacher-guided loss terms need a teacher block
pub fn validate_teacher_terms(spec: &TrainSpec) -> Result<(), ValidationError> {
    if spec.model.teacher.is_some() {
        return Ok(());
    }
    let loss = &spec.loss;
    for (name, ratio) in [
        ("dist", loss.dist_ratio),
        ("angle", loss.angle_ratio),
        ("dark", loss.dark_ratio),
    ] {
        if ratio > 0.0 {
            return Err(ValidationError::MissingTeacher(name));
        }
    }
    Ok(())
}

/// Range checks only; no filesystem access and no teacher requirement
pub fn validate_numbers(spec: &TrainSpec) -> Result<(), ValidationError> {
    if spec.data.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(spec.data.batch_size));
    }

    let optim = &spec.optimizer;
    if !(optim.lr > 0.0 && optim.lr.is_finite()) {
        return Err(ValidationError::InvalidLearningRate(optim.lr));
    }
    let valid_optimizers = ["adam", "adamw", "sgd"];
    if !valid_optimizers.contains(&optim.name.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidOptimizer(optim.name.clone()));
    }
    non_negative("weight_decay", optim.weight_decay)?;
    non_negative("momentum", optim.momentum)?;

    let loss = &spec.loss;
    non_negative("margin", loss.margin)?;
    non_negative("triplet_margin", loss.triplet_margin)?;
    for (name, value) in [
        ("metric_ratio", loss.metric_ratio),
        ("triplet_ratio", loss.triplet_ratio),
        ("dist_ratio", loss.dist_ratio),
        ("angle_ratio", loss.angle_ratio),
        ("dark_ratio", loss.dark_ratio),
        ("dark_alpha", loss.dark_alpha),
        ("dark_beta", loss.dark_beta),
    ] {
        non_negative(name, value)?;
    }
    if !(loss.temperature > 0.0 && loss.temperature.is_finite()) {
        return Err(ValidationError::InvalidTemperature(loss.temperature));
    }
    if !(0.0..=1.0).contains(&loss.alpha) {
        return Err(ValidationError::InvalidAlpha(loss.alpha));
    }

    validate_backbone(&spec.model.backbone)?;
    if spec.model.embedding_size == 0 {
        return Err(ValidationError::ZeroSize("embedding_size"));
    }
    if let Some(teacher) = &spec.model.teacher {
        validate_backbone(&teacher.backbone)?;
        if teacher.embedding_size == 0 {
            return Err(ValidationError::ZeroSize("teacher embedding_size"));
        }
        let (student, teacher) = (spec.model.backbone.input_size(), teacher.backbone.input_size());
        if student != teacher {
            return Err(ValidationError::InputSizeMismatch { student, teacher });
        }
    }

    let training = &spec.training;
    if training.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(training.epochs));
    }
    if training.recall.is_empty() || training.recall.contains(&0) {
        return Err(ValidationError::InvalidRecall(training.recall.clone()));
    }
    if training.lr_decay_epochs.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ValidationError::InvalidMilestones(training.lr_decay_epochs.clone()));
    }
    if !(training.lr_decay_gamma > 0.0 && training.lr_decay_gamma <= 1.0) {
        return Err(ValidationError::InvalidGamma(training.lr_decay_gamma));
    }
    if training.max_eval_rows == Some(0) {
        return Err(ValidationError::ZeroSize("max_eval_rows"));
    }

    Ok(())
}

fn validate_paths(spec: &TrainSpec) -> Result<(), ValidationError> {
    if !spec.data.train.exists() {
        return Err(ValidationError::TrainDataNotFound(
            spec.data.train.display().to_string(),
        ));
    }

    if let Some(val_path) = &spec.data.val {
        if !val_path.exists() {
            return Err(ValidationError::ValDataNotFound(
                val_path.display().to_string(),
            ));
        }
    }

    if let Some(teacher) = &spec.model.teacher {
        if !teacher.checkpoint.exists() {
            return Err(ValidationError::TeacherCheckpointNotFound(
                teacher.checkpoint.display().to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_backbone(backbone: &BackboneSpec) -> Result<(), ValidationError> {
    match *backbone {
        BackboneSpec::Identity { input_size } => {
            if input_size == 0 {
                return Err(ValidationError::ZeroSize("input_size"));
            }
        }
        BackboneSpec::Mlp {
            input_size,
            hidden_size,
            output_size,
            dropout,
        } => {
            for (name, size) in [
                ("input_size", input_size),
                ("hidden_size", hidden_size),
                ("output_size", output_size),
            ] {
                if size == 0 {
                    return Err(ValidationError::ZeroSize(name));
                }
            }
            if !(0.0..1.0).contains(&dropout) {
                return Err(ValidationError::InvalidDropout(dropout));
            }
        }
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NegativeValue { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;
    use std::path::PathBuf;

    fn create_valid_spec() -> TrainSpec {
        TrainSpec {
            mode: TrainMode::Teacher,
            data: DataConfig {
                dataset: Dataset::Cifar10,
                train: PathBuf::from("train.json"),
                val: None,
                batch_size: 8,
                shuffle: true,
            },
            model: ModelSpec {
                backbone: BackboneSpec::Identity { input_size: 4 },
                embedding_size: 2,
                l2normalize: true,
                teacher: None,
            },
            optimizer: OptimSpec::default(),
            loss: LossSpec::default(),
            training: TrainingParams::default(),
        }
    }

    fn with_teacher(mut spec: TrainSpec) -> TrainSpec {
        spec.model.teacher = Some(TeacherSpec {
            checkpoint: PathBuf::from("teacher.json"),
            prefix: "model.".to_string(),
            backbone: BackboneSpec::Identity { input_size: 4 },
            embedding_size: 3,
            l2normalize: true,
        });
        spec
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_numbers(&create_valid_spec()).is_ok());
        assert!(validate_numbers(&with_teacher(create_valid_spec())).is_ok());
    }

    #[test]
    fn test_student_mode_rejected() {
        let mut spec = create_valid_spec();
        spec.mode = TrainMode::Student;
        let err = validate_config(&spec).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedMode(TrainMode::Student)));
        assert!(matches!(Error::from(err), Error::Config(_)));
    }

    #[test]
    fn test_missing_train_file() {
        let err = validate_config(&create_valid_spec()).unwrap_err();
        assert!(matches!(err, ValidationError::TrainDataNotFound(_)));
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut spec = create_valid_spec();
        spec.data.batch_size = 0;
        let err = validate_numbers(&spec).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidBatchSize(0)));
    }

    #[test]
    fn test_invalid_learning_rate() {
        let mut spec = create_valid_spec();
        spec.optimizer.lr = 0.0;
        let err = validate_numbers(&spec).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidLearningRate(_)));

        spec.optimizer.lr = -0.1;
        let err = validate_numbers(&spec).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidLearningRate(_)));
    }

    #[test]
    fn test_invalid_optimizer() {
        let mut spec = create_valid_spec();
        spec.optimizer.name = "rmsprop".to_string();
        let err = validate_numbers(&spec).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOptimizer(_)));
    }

    #[test]
    fn test_invalid_temperature_and_alpha() {
        let mut spec = create_valid_spec();
        spec.loss.temperature = 0.0;
        assert!(matches!(
            validate_numbers(&spec).unwrap_err(),
            ValidationError::InvalidTemperature(_)
        ));

        let mut spec = create_valid_spec();
        spec.loss.alpha = 1.5;
        assert!(matches!(validate_numbers(&spec).unwrap_err(), ValidationError::InvalidAlpha(_)));
    }

    #[test]
    fn test_negative_margin_and_ratio() {
        let mut spec = create_valid_spec();
        spec.loss.margin = -0.1;
        assert!(matches!(
            validate_numbers(&spec).unwrap_err(),
            ValidationError::NegativeValue { name: "margin", .. }
        ));

        let mut spec = create_valid_spec();
        spec.loss.triplet_ratio = f32::NAN;
        assert!(matches!(
            validate_numbers(&spec).unwrap_err(),
            ValidationError::NegativeValue { name: "triplet_ratio", .. }
        ));
    }

    #[test]
    fn test_zero_embedding_size() {
        let mut spec = create_valid_spec();
        spec.model.embedding_size = 0;
        assert!(matches!(validate_numbers(&spec).unwrap_err(), ValidationError::ZeroSize(_)));
    }

    #[test]
    fn test_zero_eval_row_cap() {
        let mut spec = create_valid_spec();
        spec.training.max_eval_rows = Some(0);
        assert!(matches!(
            validate_numbers(&spec).unwrap_err(),
            ValidationError::ZeroSize("max_eval_rows")
        ));

        spec.training.max_eval_rows = Some(100);
        assert!(validate_numbers(&spec).is_ok());
    }

    #[test]
    fn test_invalid_recall() {
        let mut spec = create_valid_spec();
        spec.training.recall = vec![1, 0];
        assert!(matches!(validate_numbers(&spec).unwrap_err(), ValidationError::InvalidRecall(_)));

        spec.training.recall = vec![];
        assert!(matches!(validate_numbers(&spec).unwrap_err(), ValidationError::InvalidRecall(_)));
    }

    #[test]
    fn test_invalid_milestones_and_gamma() {
        let mut spec = create_valid_spec();
        spec.training.lr_decay_epochs = vec![30, 25];
        assert!(matches!(
            validate_numbers(&spec).unwrap_err(),
            ValidationError::InvalidMilestones(_)
        ));

        let mut spec = create_valid_spec();
        spec.training.lr_decay_gamma = 0.0;
        assert!(matches!(validate_numbers(&spec).unwrap_err(), ValidationError::InvalidGamma(_)));

        spec.training.lr_decay_gamma = 1.0;
        assert!(validate_numbers(&spec).is_ok());
    }

    #[test]
    fn test_relational_terms_need_teacher() {
        let mut spec = create_valid_spec();
        spec.loss.angle_ratio = 1.0;
        assert!(validate_numbers(&spec).is_ok());
        assert!(matches!(
            validate_teacher_terms(&spec).unwrap_err(),
            ValidationError::MissingTeacher("angle")
        ));
        assert!(validate_teacher_terms(&with_teacher(spec)).is_ok());
    }

    #[test]
    fn test_teacher_input_size_mismatch() {
        let mut spec = with_teacher(create_valid_spec());
        if let Some(teacher) = spec.model.teacher.as_mut() {
            teacher.backbone = BackboneSpec::Identity { input_size: 9 };
        }
        assert!(matches!(
            validate_numbers(&spec).unwrap_err(),
            ValidationError::InputSizeMismatch { student: 4, teacher: 9 }
        ));
    }

    #[test]
    fn test_invalid_dropout() {
        let mut spec = create_valid_spec();
        spec.model.backbone = BackboneSpec::Mlp {
            input_size: 4,
            hidden_size: 4,
            output_size: 4,
            dropout: 1.0,
        };
        assert!(matches!(validate_numbers(&spec).unwrap_err(), ValidationError::InvalidDropout(_)));
    }
}
