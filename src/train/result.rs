//! Training result types

use serde::{Deserialize, Serialize};

/// Summary of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Full-data loss before the first update
    pub initial_loss: f32,
    /// Full-data loss after the last update
    pub final_loss: f32,
    /// Epochs completed
    pub epochs: usize,
    /// Optimizer steps taken
    pub steps: usize,
}

impl TrainingMetrics {
    /// Whether training lowered the loss.
    pub fn improved(&self) -> bool {
        self.final_loss < self.initial_loss
    }
}
