//! Relational distillation training orchestrator

use super::{Batch, ForwardMode, MetricsTracker, Phase};
use crate::autograd::{backward, embedding_loss, Context, Tensor};
use crate::config::{
    build_loss_composer, build_optimizer, build_scheduler, validate_numbers, TrainMode, TrainSpec,
};
use crate::distill::DistillationLoss;
use crate::eval::{recall_at_k, EvalAccumulator, RecallAtK};
use crate::model::{Backbone, EmbeddingNet};
use crate::optim::{LRScheduler, MultiStepLR, Optimizer};
use crate::relational::{LossComposer, LossInput};
use crate::{Error, Result};
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one training step
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Weighted total loss
    pub loss: f32,
    /// Unweighted value of each active loss term
    pub terms: Vec<(&'static str, f32)>,
    /// Learning rate used for the step
    pub lr: f32,
    /// Global step count after this step
    pub step: usize,
}

/// Metrics of one aggregated validation pass
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    /// Recall at the first configured cutoff
    pub recall: f32,
    /// Recall at every configured cutoff
    pub recall_at_k: RecallAtK,
    /// Mean loss over the pass's batches
    pub val_loss: f32,
    /// Number of embeddings scored
    pub samples: usize,
}

/// Drives training of an embedding student against metric and relational
/// losses, with an optional frozen teacher
///
/// The caller owns the loop: call [`training_step`](Self::training_step) per
/// batch, [`validation_step`](Self::validation_step) per validation batch
/// followed by [`validation_end`](Self::validation_end), and
/// [`epoch_end`](Self::epoch_end) once per epoch. See [`Phase`] for the
/// allowed transitions.
pub struct RkdTrainer {
    hparams: Arc<TrainSpec>,
    student: EmbeddingNet,
    teacher: Option<EmbeddingNet>,
    composer: LossComposer,
    /// Separate miners so validation never draws from the training samplers
    val_composer: LossComposer,
    optimizer: Box<dyn Optimizer>,
    scheduler: MultiStepLR,
    distill: DistillationLoss,
    accumulator: EvalAccumulator,
    val_losses: Vec<f32>,
    phase: Phase,

    /// Metric history
    pub metrics: MetricsTracker,
}

impl RkdTrainer {
    /// Wrap `student` with the embedding head and wire losses and optimizer
    ///
    /// The teacher, if any, is frozen before anything else touches it.
    ///
    /// # Errors
    ///
    /// `Error::Config` for student mode, out-of-range hyperparameters, or
    /// teacher-guided loss terms without a teacher.
    pub fn new(
        student: Box<dyn Backbone>,
        teacher: Option<EmbeddingNet>,
        hparams: Arc<TrainSpec>,
    ) -> Result<Self> {
        if hparams.mode == TrainMode::Student {
            return Err(Error::Config(format!(
                "training mode '{}' is not implemented",
                hparams.mode
            )));
        }
        validate_numbers(&hparams)?;

        let seed = hparams.training.seed;
        let student = EmbeddingNet::new(
            student,
            hparams.model.embedding_size,
            hparams.model.l2normalize,
            seed,
        )?;
        let teacher = teacher.map(|mut t| {
            t.freeze();
            t
        });

        let composer = build_loss_composer(&hparams.loss, seed)?;
        let val_composer = build_loss_composer(&hparams.loss, seed)?;
        match &teacher {
            Some(t) if t.input_size() != student.input_size() => {
                return Err(Error::Config(format!(
                    "teacher input size {} does not match student input size {}",
                    t.input_size(),
                    student.input_size()
                )));
            }
            None if composer.requires_reference() => {
                return Err(Error::Config(format!(
                    "loss terms {:?} need a teacher network",
                    composer.active_terms()
                )));
            }
            _ => {}
        }

        let optimizer = build_optimizer(&hparams.optimizer)?;
        let scheduler = build_scheduler(&hparams);
        let distill = DistillationLoss::new(hparams.loss.temperature, hparams.loss.alpha)?;
        let accumulator = match hparams.training.max_eval_rows {
            Some(max) => EvalAccumulator::with_max_rows(max),
            None => EvalAccumulator::new(),
        };

        info!(
            student = %student.describe(),
            teacher = teacher.as_ref().map(EmbeddingNet::describe).as_deref().unwrap_or("none"),
            terms = ?composer.active_terms(),
            optimizer = optimizer.name(),
            lr = optimizer.lr(),
            "trainer ready"
        );

        Ok(Self {
            hparams,
            student,
            teacher,
            composer,
            val_composer,
            optimizer,
            scheduler,
            distill,
            accumulator,
            val_losses: Vec::new(),
            phase: Phase::Uninitialized,
            metrics: MetricsTracker::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn hparams(&self) -> &TrainSpec {
        &self.hparams
    }

    pub fn student(&self) -> &EmbeddingNet {
        &self.student
    }

    pub fn teacher(&self) -> Option<&EmbeddingNet> {
        self.teacher.as_ref()
    }

    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    /// Embeddings collected by the current validation pass
    pub fn pending_validation_samples(&self) -> usize {
        self.accumulator.len()
    }

    /// True when no teacher parameter tracks gradients (or there is no teacher)
    pub fn teacher_frozen(&self) -> bool {
        self.teacher.as_ref().map_or(true, EmbeddingNet::is_frozen)
    }

    /// Embed `inputs` with the selected network in evaluation mode
    pub fn forward(&self, inputs: &Array2<f32>, mode: ForwardMode) -> Result<Array2<f32>> {
        let ctx = Context::evaluation();
        match mode {
            ForwardMode::Student => self.student.embed(inputs, &ctx),
            ForwardMode::Teacher => self
                .teacher
                .as_ref()
                .ok_or_else(|| Error::Config("no teacher network configured".to_string()))?
                .embed(inputs, &ctx),
        }
    }

    /// [`forward`](Self::forward) with the mode given by name
    pub fn forward_named(&self, inputs: &Array2<f32>, mode: &str) -> Result<Array2<f32>> {
        self.forward(inputs, mode.parse()?)
    }

    /// Knowledge-distillation loss with the configured temperature and alpha
    pub fn distillation_loss(
        &self,
        student_logits: &Array2<f32>,
        teacher_logits: &Array2<f32>,
        labels: &[usize],
    ) -> Result<f32> {
        self.distill.forward(student_logits, teacher_logits, labels)
    }

    /// One optimizer step on a training batch
    ///
    /// An unfinished validation pass is abandoned first.
    pub fn training_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        self.ensure_live()?;
        if self.phase == Phase::Validating {
            self.abandon_validation("training resumed");
        }
        self.phase = Phase::Training;
        let result = self.train_batch(batch);
        self.terminate_on_error(result)
    }

    /// Evaluate one validation batch and collect its embeddings
    ///
    /// The first call of a pass clears whatever a previous pass left behind.
    pub fn validation_step(&mut self, batch: &Batch) -> Result<f32> {
        self.ensure_live()?;
        if self.phase != Phase::Validating {
            self.accumulator.reset();
            self.val_losses.clear();
            self.phase = Phase::Validating;
        }
        let result = self.validate_batch(batch);
        self.terminate_on_error(result)
    }

    /// Score the collected embeddings and close the validation pass
    pub fn validation_end(&mut self) -> Result<ValidationSummary> {
        if self.phase != Phase::Validating {
            return Err(Error::InvalidState(format!(
                "validation end requires an open validation pass, trainer is {}",
                self.phase
            )));
        }

        let (embeddings, labels) = self.accumulator.drain();
        let losses = std::mem::take(&mut self.val_losses);
        let result = recall_at_k(embeddings.view(), &labels, &self.hparams.training.recall);
        let recall_at_k = self.terminate_on_error(result)?;

        let val_loss = losses.iter().sum::<f32>() / losses.len().max(1) as f32;
        let summary = ValidationSummary {
            recall: recall_at_k.headline(),
            recall_at_k,
            val_loss,
            samples: labels.len(),
        };
        self.metrics.record_validation(summary.val_loss, summary.recall);
        self.phase = Phase::ValidationAggregated;

        info!(
            epoch = self.metrics.epoch,
            recall = %summary.recall_at_k,
            val_loss,
            samples = summary.samples,
            "validation"
        );
        Ok(summary)
    }

    /// Drop an open validation pass without reporting anything
    pub fn abort_validation(&mut self) {
        if self.phase == Phase::Validating {
            self.abandon_validation("aborted");
            self.phase = if self.metrics.steps > 0 {
                Phase::Training
            } else {
                Phase::Uninitialized
            };
        }
    }

    /// Close the epoch and apply the milestone learning-rate decay
    ///
    /// Returns the learning rate for the next epoch.
    pub fn epoch_end(&mut self) -> Result<f32> {
        self.ensure_live()?;
        if self.phase == Phase::Validating {
            self.abandon_validation("epoch ended");
            self.phase = Phase::Training;
        }

        let avg = self.metrics.end_epoch(self.optimizer.lr());
        self.scheduler.step();
        self.scheduler.apply(self.optimizer.as_mut());
        let lr = self.optimizer.lr();
        info!(epoch = self.metrics.epoch, loss = avg, lr, "epoch complete");
        Ok(lr)
    }

    /// Stop the run; every later step is rejected
    pub fn finish(&mut self) {
        if self.phase != Phase::Terminal {
            info!(epochs = self.metrics.epoch, steps = self.metrics.steps, "training finished");
        }
        self.phase = Phase::Terminal;
    }

    fn ensure_live(&self) -> Result<()> {
        if self.phase == Phase::Terminal {
            return Err(Error::InvalidState("trainer is terminal".to_string()));
        }
        Ok(())
    }

    fn terminate_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, phase = %self.phase, "step failed, trainer is terminal");
            self.phase = Phase::Terminal;
        }
        result
    }

    fn abandon_validation(&mut self, reason: &str) {
        warn!(
            batches = self.val_losses.len(),
            samples = self.accumulator.len(),
            reason,
            "validation pass abandoned"
        );
        self.accumulator.reset();
        self.val_losses.clear();
    }

    fn check_width(&self, batch: &Batch) -> Result<()> {
        let expected = self.student.input_size();
        if batch.inputs.ncols() != expected {
            return Err(Error::ShapeMismatch {
                expected: vec![batch.size(), expected],
                got: vec![batch.size(), batch.inputs.ncols()],
            });
        }
        Ok(())
    }

    /// Teacher embeddings when an active term needs them
    fn reference(&self, batch: &Batch) -> Result<Option<Array2<f32>>> {
        if !self.composer.requires_reference() {
            return Ok(None);
        }
        match &self.teacher {
            Some(teacher) => teacher.embed(&batch.inputs, &Context::evaluation()).map(Some),
            None => Err(Error::Config(
                "teacher embeddings required but no teacher network configured".to_string(),
            )),
        }
    }

    fn train_batch(&mut self, batch: &Batch) -> Result<StepOutput> {
        self.check_width(batch)?;
        let (rows, dim) = (batch.size(), self.student.embedding_size());

        self.optimizer.zero_grad(self.student.parameters_mut());
        let inputs = Tensor::from_array2(&batch.inputs, false);
        let embeddings = self.student.forward(&inputs, rows, &Context::new())?;
        let reference = self.reference(batch)?;

        let composed = {
            let view = embeddings.view2(rows, dim)?;
            let input = LossInput::new(view, &batch.labels, reference.as_ref().map(|r| r.view()))?;
            self.composer.compute(&input)?
        };

        let value = composed.total.value;
        let grad = Array1::from_iter(composed.total.grad.iter().copied());
        let mut loss = embedding_loss(&embeddings, value, grad);
        backward(&mut loss, None);
        self.optimizer.step(self.student.parameters_mut());

        self.metrics.record_step(value);
        let step = self.metrics.steps;
        let lr = self.optimizer.lr();
        debug!(step, loss = value, terms = ?composed.terms, "training step");

        let interval = self.hparams.training.log_interval;
        if interval > 0 && step % interval == 0 {
            info!(
                epoch = self.metrics.epoch,
                step,
                loss = self.metrics.epoch_average(),
                lr,
                "training"
            );
        }

        Ok(StepOutput {
            loss: value,
            terms: composed.terms,
            lr,
            step,
        })
    }

    fn validate_batch(&mut self, batch: &Batch) -> Result<f32> {
        self.check_width(batch)?;
        let embeddings = self.student.embed(&batch.inputs, &Context::evaluation())?;
        let reference = self.reference(batch)?;

        let value = {
            let input = LossInput::new(
                embeddings.view(),
                &batch.labels,
                reference.as_ref().map(|r| r.view()),
            )?;
            self.val_composer.evaluate(&input)?
        };

        self.accumulator.append(embeddings.view(), &batch.labels)?;
        self.val_losses.push(value);
        debug!(
            batch = self.val_losses.len(),
            loss = value,
            collected = self.accumulator.len(),
            "validation step"
        );
        Ok(value)
    }
}

impl std::fmt::Debug for RkdTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RkdTrainer")
            .field("phase", &self.phase)
            .field("student", &self.student)
            .field("teacher", &self.teacher)
            .field("terms", &self.composer.active_terms())
            .field("lr", &self.optimizer.lr())
            .finish()
    }
}
