//! Epoch loop and supervised fitting

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::batch::shuffled_batches;
use super::loss::cross_entropy_with_logits;
use super::result::TrainingMetrics;
use crate::mlp::Mlp;
use crate::optim::Adam;

/// Optimization schedule of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self { epochs: 30, batch_size: 32, learning_rate: 1e-3 }
    }
}

/// Run `config.epochs` epochs of shuffled mini-batch Adam updates.
///
/// `batch_loss` receives the model's logits for a batch and the row indices
/// (into `x`) that make up the batch, and returns the batch loss together
/// with ∂loss/∂logits.
pub fn run_epochs<R, F>(
    model: &mut Mlp,
    x: &Array2<f32>,
    config: &TrainingConfig,
    rng: &mut R,
    mut batch_loss: F,
) -> Result<TrainingMetrics>
where
    R: Rng + ?Sized,
    F: FnMut(&Array2<f32>, &[usize]) -> Result<(f32, Array2<f32>)>,
{
    if x.nrows() == 0 {
        return Err(CellDistillError::Internal { message: "cannot train on an empty matrix".into() });
    }

    let all_rows: Vec<usize> = (0..x.nrows()).collect();
    let initial_loss = batch_loss(&model.forward_trace(x)?.logits, &all_rows)?.0;

    let mut optimizer = Adam::default_params(config.learning_rate);
    let mut steps = 0;
    for epoch in 0..config.epochs {
        let mut epoch_loss = 0.0;
        let batches = shuffled_batches(x.nrows(), config.batch_size, &mut *rng);
        for rows in &batches {
            let xb = x.select(Axis(0), rows);
            let trace = model.forward_trace(&xb)?;
            let (loss, grad) = batch_loss(&trace.logits, rows)?;
            let grads = model.backward(&trace, &grad);
            model.apply_gradients(&grads, &mut optimizer);
            epoch_loss += loss * rows.len() as f32;
            steps += 1;
        }
        debug!(epoch = epoch + 1, loss = epoch_loss / x.nrows() as f32, "epoch finished");
    }

    let final_loss = batch_loss(&model.forward_trace(x)?.logits, &all_rows)?.0;
    Ok(TrainingMetrics { initial_loss, final_loss, epochs: config.epochs, steps })
}

/// Fit `model` to one-hot `targets` with categorical cross-entropy.
pub fn fit_supervised<R: Rng + ?Sized>(
    model: &mut Mlp,
    x: &Array2<f32>,
    targets: &Array2<f32>,
    config: &TrainingConfig,
    rng: &mut R,
) -> Result<TrainingMetrics> {
    if targets.nrows() != x.nrows() || targets.ncols() != model.config().n_classes {
        return Err(CellDistillError::ShapeMismatch {
            expected: vec![x.nrows(), model.config().n_classes],
            actual: targets.shape().to_vec(),
        });
    }

    run_epochs(model, x, config, rng, |logits, rows| {
        let yb = targets.select(Axis(0), rows);
        Ok(cross_entropy_with_logits(logits, &yb))
    })
}
