//! Distillation loss functions

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};

use crate::entropy::softmax_rows;
use crate::train::{cross_entropy_with_logits, log_softmax_rows};

/// Knowledge Distillation Loss
///
/// Blends the hard-label loss of the student with a temperature-softened
/// divergence from a frozen teacher.
///
/// # Formula
///
/// ```text
/// L = α * CE(student, labels)
///   + (1-α) * T² * KL(softmax(teacher/T) || softmax(student/T))
/// ```
///
/// where T is temperature and α is the weight of the hard-label term.
///
/// # Example
///
/// ```
/// use celldistill::distill::DistillationLoss;
/// use ndarray::array;
///
/// let loss_fn = DistillationLoss::new(3.0, 0.1);
/// let student_logits = array![[2.0, 1.0, 0.5]];
/// let teacher_logits = array![[1.5, 1.2, 0.8]];
/// let targets = array![[1.0, 0.0, 0.0]];
///
/// let loss = loss_fn.forward(&student_logits, &teacher_logits, &targets);
/// assert!(loss > 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistillationLoss {
    /// Temperature for softening probability distributions
    pub temperature: f32,
    /// Weight of the hard-label loss (α). Distillation weight is (1-α)
    pub alpha: f32,
}

impl Default for DistillationLoss {
    fn default() -> Self {
        Self { temperature: 3.0, alpha: 0.1 }
    }
}

impl DistillationLoss {
    /// Create a new distillation loss function
    ///
    /// # Panics
    ///
    /// Panics if temperature <= 0 or alpha not in [0, 1]; see
    /// [`DistillationLoss::try_new`] for values read from configuration.
    pub fn new(temperature: f32, alpha: f32) -> Self {
        assert!(temperature > 0.0, "Temperature must be positive, got {temperature}");
        assert!((0.0..=1.0).contains(&alpha), "Alpha must be in [0, 1], got {alpha}");

        Self { temperature, alpha }
    }

    /// Checked constructor for configured values.
    pub fn try_new(temperature: f32, alpha: f32) -> Result<Self> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(CellDistillError::ConfigValue {
                field: "distillation.temperature".into(),
                message: format!("Temperature must be positive, got {temperature}"),
                suggestion: "Use temperature 1.0-8.0 (3.0 recommended)".into(),
            });
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(CellDistillError::ConfigValue {
                field: "distillation.alpha".into(),
                message: format!("Alpha must be between 0 and 1, got {alpha}"),
                suggestion: "Use alpha 0.1 (mostly teacher signal) to 0.5".into(),
            });
        }
        Ok(Self { temperature, alpha })
    }

    /// Combined loss (scalar, averaged over the batch)
    ///
    /// * `student_logits` - [batch_size, num_classes]
    /// * `teacher_logits` - [batch_size, num_classes]
    /// * `targets` - one-hot ground truth [batch_size, num_classes]
    pub fn forward(
        &self,
        student_logits: &Array2<f32>,
        teacher_logits: &Array2<f32>,
        targets: &Array2<f32>,
    ) -> f32 {
        self.forward_backward(student_logits, teacher_logits, targets).0
    }

    /// Loss together with its gradient with respect to the student logits.
    ///
    /// ```text
    /// ∂L/∂s = α (softmax(s) - y) / B + (1-α) T (softmax(s/T) - softmax(t/T)) / B
    /// ```
    pub fn forward_backward(
        &self,
        student_logits: &Array2<f32>,
        teacher_logits: &Array2<f32>,
        targets: &Array2<f32>,
    ) -> (f32, Array2<f32>) {
        assert_eq!(
            student_logits.shape(),
            teacher_logits.shape(),
            "Student and teacher logits must have same shape"
        );

        let (hard_loss, hard_grad) = cross_entropy_with_logits(student_logits, targets);

        let t = self.temperature;
        let student_soft = softmax_rows(&(student_logits / t));
        let teacher_soft = softmax_rows(&(teacher_logits / t));
        let kl = kl_divergence(&teacher_soft, &(student_logits / t));

        let batch = student_logits.nrows().max(1) as f32;
        let soft_grad = (&student_soft - &teacher_soft) * (t / batch);

        let loss = self.alpha * hard_loss + (1.0 - self.alpha) * t * t * kl;
        let grad = hard_grad * self.alpha + soft_grad * (1.0 - self.alpha);
        (loss, grad)
    }
}

/// Batch-mean KL(p || softmax(q_logits)).
///
/// KL(p || q) = Σ p_i * (log p_i - log q_i), skipping p_i = 0
fn kl_divergence(p: &Array2<f32>, q_logits: &Array2<f32>) -> f32 {
    let log_q = log_softmax_rows(q_logits);

    let mut total_kl = 0.0;
    for (p_row, log_q_row) in p.axis_iter(Axis(0)).zip(log_q.axis_iter(Axis(0))) {
        for (&p_i, &log_q_i) in p_row.iter().zip(log_q_row.iter()) {
            if p_i > 0.0 {
                total_kl += p_i * (p_i.ln() - log_q_i);
            }
        }
    }

    total_kl / p.nrows().max(1) as f32
}
