//! Distillation loss functions

use crate::{Error, Result};
use ndarray::{Array2, Axis};

/// Knowledge Distillation Loss
///
/// Combines soft targets from the teacher (temperature-scaled KL divergence)
/// with hard targets from ground truth labels (cross-entropy).
///
/// # Formula
///
/// ```text
/// L = α * T² * KL(softmax(teacher/T) || softmax(student/T))
///   + (1-α) * CE(student, labels)
/// ```
///
/// where T is temperature and α is the distillation weight. The T² factor
/// keeps the soft-target gradient on the same scale for every temperature.
///
/// # Example
///
/// ```
/// use rkd::distill::DistillationLoss;
/// use ndarray::array;
///
/// let loss_fn = DistillationLoss::new(2.0, 0.7).unwrap();
/// let student_logits = array![[2.0, 1.0, 0.5]];
/// let teacher_logits = array![[1.5, 1.2, 0.8]];
/// let labels = vec![0];
///
/// let loss = loss_fn.forward(&student_logits, &teacher_logits, &labels).unwrap();
/// assert!(loss > 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistillationLoss {
    /// Temperature for softening probability distributions
    pub temperature: f32,
    /// Weight for distillation loss (α). Hard loss weight is (1-α)
    pub alpha: f32,
}

impl DistillationLoss {
    /// Create a new distillation loss function
    ///
    /// # Errors
    ///
    /// `Error::Config` if temperature <= 0 or alpha not in [0, 1]
    pub fn new(temperature: f32, alpha: f32) -> Result<Self> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(Error::Config(format!(
                "Temperature must be positive, got {temperature}"
            )));
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::Config(format!("Alpha must be in [0, 1], got {alpha}")));
        }

        Ok(Self { temperature, alpha })
    }

    /// Compute the distillation loss
    ///
    /// * `student_logits` - [batch_size, num_classes]
    /// * `teacher_logits` - [batch_size, num_classes]
    /// * `labels` - [batch_size], each below num_classes
    pub fn forward(
        &self,
        student_logits: &Array2<f32>,
        teacher_logits: &Array2<f32>,
        labels: &[usize],
    ) -> Result<f32> {
        check_shapes(student_logits, teacher_logits, labels)?;

        let kl_loss = self.kl_divergence_loss(student_logits, teacher_logits);
        let ce_loss = cross_entropy_loss(student_logits, labels);

        Ok(self.alpha * kl_loss * self.temperature * self.temperature
            + (1.0 - self.alpha) * ce_loss)
    }

    /// Loss value and its gradient with respect to the student logits
    ///
    /// ```text
    /// ∂L/∂s = α·T·(softmax(s/T) - softmax(t/T)) / B + (1-α)·(softmax(s) - onehot) / B
    /// ```
    pub fn forward_with_grad(
        &self,
        student_logits: &Array2<f32>,
        teacher_logits: &Array2<f32>,
        labels: &[usize],
    ) -> Result<(f32, Array2<f32>)> {
        let value = self.forward(student_logits, teacher_logits, labels)?;
        let batch = student_logits.nrows().max(1) as f32;

        let student_soft = softmax_2d(&(student_logits / self.temperature));
        let teacher_soft = softmax_2d(&(teacher_logits / self.temperature));
        let mut hard = softmax_2d(student_logits);
        for (i, &label) in labels.iter().enumerate() {
            hard[[i, label]] -= 1.0;
        }

        let soft_scale = self.alpha * self.temperature / batch;
        let hard_scale = (1.0 - self.alpha) / batch;
        let grad = (student_soft - teacher_soft) * soft_scale + hard * hard_scale;
        Ok((value, grad))
    }

    /// Temperature-scaled KL divergence, without the α·T² factor
    ///
    /// KL(teacher || student) where both distributions are softened by temperature
    pub fn kl_divergence_loss(&self, student_logits: &Array2<f32>, teacher_logits: &Array2<f32>) -> f32 {
        let student_soft = softmax_2d(&(student_logits / self.temperature));
        let teacher_soft = softmax_2d(&(teacher_logits / self.temperature));

        kl_divergence(&teacher_soft, &student_soft)
    }
}

fn check_shapes(student: &Array2<f32>, teacher: &Array2<f32>, labels: &[usize]) -> Result<()> {
    if student.shape() != teacher.shape() {
        return Err(Error::ShapeMismatch {
            expected: student.shape().to_vec(),
            got: teacher.shape().to_vec(),
        });
    }
    if student.nrows() != labels.len() {
        return Err(Error::ShapeMismatch {
            expected: vec![student.nrows()],
            got: vec![labels.len()],
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= student.ncols()) {
        return Err(Error::Config(format!(
            "Label {label} out of range for {} classes",
            student.ncols()
        )));
    }
    Ok(())
}

/// Standard cross-entropy loss with hard labels, averaged over the batch
pub fn cross_entropy_loss(logits: &Array2<f32>, labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let probs = softmax_2d(logits);

    let mut loss = 0.0;
    for (i, &label) in labels.iter().enumerate() {
        let prob = probs[[i, label]].max(1e-10);
        loss -= prob.ln();
    }

    loss / labels.len() as f32
}

/// Compute softmax along last axis for 2D array
///
/// softmax(x)_i = exp(x_i) / Σ exp(x_j)
pub(crate) fn softmax_2d(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        // Subtract max for numerical stability
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_val).exp());

        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    result
}

/// KL divergence between two probability distributions
///
/// KL(p || q) = Σ p_i * log(p_i / q_i), averaged over the batch dimension.
fn kl_divergence(p: &Array2<f32>, q: &Array2<f32>) -> f32 {
    if p.nrows() == 0 {
        return 0.0;
    }
    let mut total_kl = 0.0;

    for (p_row, q_row) in p.axis_iter(Axis(0)).zip(q.axis_iter(Axis(0))) {
        let mut kl = 0.0;
        for (&p_i, &q_i) in p_row.iter().zip(q_row.iter()) {
            if p_i > 1e-10 {
                kl += p_i * (p_i / q_i.max(1e-10)).ln();
            }
        }
        total_kl += kl;
    }

    total_kl / p.nrows() as f32
}
