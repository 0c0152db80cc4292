//! Student training against a frozen teacher

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};
use rand::Rng;
use tracing::info;

use super::loss::DistillationLoss;
use crate::mlp::{Classifier, Mlp};
use crate::train::{run_epochs, TrainingConfig, TrainingMetrics};

/// Trains a student on hard labels plus the softened outputs of a teacher.
///
/// The teacher is evaluated once up front; its logits stay fixed for the
/// whole run.
#[derive(Debug, Clone)]
pub struct Distiller {
    loss: DistillationLoss,
    training: TrainingConfig,
}

impl Distiller {
    pub fn new(loss: DistillationLoss, training: TrainingConfig) -> Self {
        Self { loss, training }
    }

    pub fn loss(&self) -> &DistillationLoss {
        &self.loss
    }

    /// Optimize `student` on (`x`, `targets`) against `teacher`.
    pub fn distill<R: Rng + ?Sized>(
        &self,
        student: &mut Mlp,
        teacher: &dyn Classifier,
        x: &Array2<f32>,
        targets: &Array2<f32>,
        rng: &mut R,
    ) -> Result<TrainingMetrics> {
        if teacher.n_classes() != student.config().n_classes {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![student.config().n_classes],
                actual: vec![teacher.n_classes()],
            });
        }
        if targets.dim() != (x.nrows(), student.config().n_classes) {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![x.nrows(), student.config().n_classes],
                actual: targets.shape().to_vec(),
            });
        }

        let teacher_logits = teacher.logits(x)?;
        let metrics = run_epochs(student, x, &self.training, rng, |logits, rows| {
            let tb = teacher_logits.select(Axis(0), rows);
            let yb = targets.select(Axis(0), rows);
            Ok(self.loss.forward_backward(logits, &tb, &yb))
        })?;

        info!(
            temperature = self.loss.temperature,
            alpha = self.loss.alpha,
            initial_loss = metrics.initial_loss,
            final_loss = metrics.final_loss,
            "student distilled"
        );
        Ok(metrics)
    }
}
