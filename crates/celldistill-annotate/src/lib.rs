//! Reference training and two-round cell-type prediction.
//!
//! - Train a reference classifier from a labelled expression matrix
//! - Predict target cells directly, or in two rounds where a student
//!   distilled on the confident cells relabels the uncertain ones
//! - Configure everything through YAML, validated before any data is read

pub mod config;
pub mod pipeline;
pub mod training;
pub mod validation;

pub use config::{AnnotateConfig, PredictType, TrainConfig};
pub use pipeline::{Pipeline, PipelineResult, PredictPlan};
pub use training::{train_reference, TrainResult};
pub use validation::ConfigValidator;

use celldistill_common::Result;

/// Run the prediction pipeline with the given configuration.
pub fn run(config: &AnnotateConfig) -> Result<PipelineResult> {
    ConfigValidator::validate(config)?;
    Pipeline::new(config).execute()
}

/// Train and save a reference model.
pub fn train(config: &TrainConfig) -> Result<TrainResult> {
    ConfigValidator::validate_training_config(config)?;
    train_reference(config)
}
