//! Mini-batch training of [`Mlp`](crate::mlp::Mlp) classifiers
//!
//! One loop serves both supervised fitting (teacher and reference models)
//! and distillation (student), differing only in the per-batch loss.

mod batch;
mod loss;
mod result;
mod trainer;

pub use batch::shuffled_batches;
pub use loss::{cross_entropy_with_logits, log_softmax_rows};
pub use result::TrainingMetrics;
pub use trainer::{fit_supervised, run_epochs, TrainingConfig};
