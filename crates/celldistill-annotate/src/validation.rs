//! Configuration validation (Jidoka - built-in quality).
//!
//! Validates configuration before any data is loaded to catch errors early
//! and provide actionable feedback.

use crate::config::{AnnotateConfig, CoverageParams, DistillationParams, PredictionParams, TrainConfig, TrainingParams};
use celldistill::distill::DistillationLoss;
use celldistill::partition::EntropyPartitioner;
use celldistill::preprocess::Preprocessor;
use celldistill_common::{CellDistillError, Result};
use std::path::Path;

/// Configuration validator implementing Jidoka principle.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a prediction configuration.
    ///
    /// Returns `Ok(())` if valid, or an error with actionable suggestions.
    pub fn validate(config: &AnnotateConfig) -> Result<()> {
        Self::validate_path("model.dir", &config.model.dir)?;
        Self::validate_path("input.path", &config.input.path)?;
        Self::validate_path("output.dir", &config.output.dir)?;
        Self::validate_prediction(&config.prediction)?;
        Self::validate_distillation(&config.distillation)?;
        Self::validate_coverage(&config.coverage)?;
        Self::validate_preprocess(&config.preprocess)?;
        Ok(())
    }

    /// Validate a reference training configuration.
    pub fn validate_training_config(config: &TrainConfig) -> Result<()> {
        Self::validate_path("input.path", &config.input.path)?;
        Self::validate_path("metadata.path", &config.metadata.path)?;
        Self::validate_path("model.dir", &config.model.dir)?;
        if config.metadata.celltype_column.trim().is_empty() {
            return Err(CellDistillError::ConfigValue {
                field: "metadata.celltype_column".into(),
                message: "Cell-type column name cannot be empty".into(),
                suggestion: "Name the metadata column holding the labels, e.g. 'celltype'".into(),
            });
        }
        if config.features.num_features == 0 {
            return Err(CellDistillError::ConfigValue {
                field: "features.num_features".into(),
                message: "Number of selected features must be positive".into(),
                suggestion: "Use 3000 features, or method: none to keep all".into(),
            });
        }
        Self::validate_training(&config.training)?;
        Self::validate_preprocess(&config.preprocess)?;
        Ok(())
    }

    fn validate_path(field: &str, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(CellDistillError::ConfigValue {
                field: field.into(),
                message: "Path cannot be empty".into(),
                suggestion: format!("Set {field} in the config file"),
            });
        }
        Ok(())
    }

    fn validate_prediction(config: &PredictionParams) -> Result<()> {
        EntropyPartitioner::new(config.confidence_fraction)?;
        Ok(())
    }

    fn validate_distillation(config: &DistillationParams) -> Result<()> {
        DistillationLoss::try_new(config.temperature, config.alpha)?;

        if config.min_confident_classes == 0 {
            return Err(CellDistillError::ConfigValue {
                field: "distillation.min_confident_classes".into(),
                message: "At least one confident class is required".into(),
                suggestion: "Use 2 so the teacher sees more than one cell type".into(),
            });
        }

        Self::validate_schedule("distillation", config.epochs, config.batch_size, config.learning_rate)?;
        if config.teacher_epochs == 0 {
            return Err(CellDistillError::ConfigValue {
                field: "distillation.teacher_epochs".into(),
                message: "Number of teacher epochs must be positive".into(),
                suggestion: "Use 30 epochs".into(),
            });
        }
        Self::validate_hidden_dims("distillation.hidden_dims", &config.hidden_dims)
    }

    fn validate_training(config: &TrainingParams) -> Result<()> {
        Self::validate_schedule("training", config.epochs, config.batch_size, config.learning_rate)?;
        Self::validate_hidden_dims("training.hidden_dims", &config.hidden_dims)
    }

    fn validate_schedule(section: &str, epochs: usize, batch_size: usize, learning_rate: f32) -> Result<()> {
        if epochs == 0 {
            return Err(CellDistillError::ConfigValue {
                field: format!("{section}.epochs"),
                message: "Number of epochs must be positive".into(),
                suggestion: "Use 30 epochs".into(),
            });
        }

        if batch_size == 0 {
            return Err(CellDistillError::ConfigValue {
                field: format!("{section}.batch_size"),
                message: "Batch size must be positive".into(),
                suggestion: "Use batch_size 32".into(),
            });
        }

        if learning_rate <= 0.0 {
            return Err(CellDistillError::ConfigValue {
                field: format!("{section}.learning_rate"),
                message: "Learning rate must be positive".into(),
                suggestion: "Use 1e-3 (Adam default)".into(),
            });
        }

        if learning_rate > 0.1 {
            return Err(CellDistillError::ConfigValue {
                field: format!("{section}.learning_rate"),
                message: format!("Learning rate {learning_rate} is too high"),
                suggestion: "Use learning rate < 0.01 to avoid training instability".into(),
            });
        }

        Ok(())
    }

    fn validate_hidden_dims(field: &str, dims: &[usize]) -> Result<()> {
        if dims.is_empty() || dims.contains(&0) {
            return Err(CellDistillError::ConfigValue {
                field: field.into(),
                message: format!("Hidden layers must be non-empty and positive, got {dims:?}"),
                suggestion: "Use [64, 16]".into(),
            });
        }
        Ok(())
    }

    fn validate_coverage(config: &CoverageParams) -> Result<()> {
        if !(0.0..=1.0).contains(&config.warn_below) {
            return Err(CellDistillError::ConfigValue {
                field: "coverage.warn_below".into(),
                message: format!("Coverage threshold must be in [0, 1], got {}", config.warn_below),
                suggestion: "Use 0.7".into(),
            });
        }

        if let Some(fail_below) = config.fail_below {
            if !(0.0..=1.0).contains(&fail_below) {
                return Err(CellDistillError::ConfigValue {
                    field: "coverage.fail_below".into(),
                    message: format!("Coverage minimum must be in [0, 1], got {fail_below}"),
                    suggestion: "Use 0.5, or remove the key to only warn".into(),
                });
            }
            if fail_below > config.warn_below {
                return Err(CellDistillError::ConfigValue {
                    field: "coverage.fail_below".into(),
                    message: format!("Hard minimum {fail_below} is above the warning level {}", config.warn_below),
                    suggestion: "Keep fail_below at or below warn_below".into(),
                });
            }
        }

        Ok(())
    }

    fn validate_preprocess(config: &Preprocessor) -> Result<()> {
        if !(config.target_sum > 0.0) {
            return Err(CellDistillError::ConfigValue {
                field: "preprocess.target_sum".into(),
                message: format!("Target sum must be positive, got {}", config.target_sum),
                suggestion: "Use 10000".into(),
            });
        }

        if !(config.scale_max > 0.0) {
            return Err(CellDistillError::ConfigValue {
                field: "preprocess.scale_max".into(),
                message: format!("Scale clip must be positive, got {}", config.scale_max),
                suggestion: "Use 6".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AnnotateConfig {
        AnnotateConfig::minimal("models/pbmc", "data/target.csv")
    }

    #[test]
    fn test_valid_minimal_config() {
        let result = ConfigValidator::validate(&config());
        assert!(result.is_ok(), "Validation failed: {:?}", result.err());
    }

    #[test]
    fn test_empty_model_dir() {
        let mut config = config();
        config.model.dir = "".into();

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("model.dir"));
    }

    #[test]
    fn test_invalid_confidence_fraction() {
        for bad in [0.0, 1.0, -0.2, 1.5] {
            let mut config = config();
            config.prediction.confidence_fraction = bad;
            let err = ConfigValidator::validate(&config).unwrap_err();
            assert!(err.to_string().contains("confidence_fraction"));
        }
    }

    #[test]
    fn test_fraction_range_matches_partitioner() {
        for q in [0.0, 1e-6, 0.4, 0.999_999, 1.0, f64::NAN] {
            let mut config = config();
            config.prediction.confidence_fraction = q;
            assert_eq!(ConfigValidator::validate(&config).is_ok(), EntropyPartitioner::new(q).is_ok(), "q = {q}");
        }
    }

    #[test]
    fn test_nan_alpha_rejected() {
        let mut config = config();
        config.distillation.alpha = f32::NAN;
        assert!(ConfigValidator::validate(&config).unwrap_err().to_string().contains("alpha"));
    }

    #[test]
    fn test_invalid_temperature() {
        let mut config = config();
        config.distillation.temperature = -1.0;

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("temperature"));
    }

    #[test]
    fn test_invalid_alpha() {
        let mut config = config();
        config.distillation.alpha = 1.5;

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("alpha"));
    }

    #[test]
    fn test_invalid_learning_rate() {
        let mut config = config();
        config.distillation.learning_rate = 0.5;

        let result = ConfigValidator::validate(&config);
        assert!(result.unwrap_err().to_string().contains("learning_rate"));
    }

    #[test]
    fn test_zero_epochs_and_batch() {
        let mut config = config();
        config.distillation.teacher_epochs = 0;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = self::config();
        config.distillation.batch_size = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_bad_hidden_dims() {
        let mut config = config();
        config.distillation.hidden_dims = vec![64, 0];
        assert!(ConfigValidator::validate(&config).unwrap_err().to_string().contains("hidden_dims"));
    }

    #[test]
    fn test_fail_below_above_warning_rejected() {
        let mut config = config();
        config.coverage.fail_below = Some(0.9);
        assert!(ConfigValidator::validate(&config).unwrap_err().to_string().contains("fail_below"));

        config.coverage.fail_below = Some(0.5);
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_training_config() {
        let mut config = TrainConfig::minimal("ref.csv", "meta.csv", "out");
        assert!(ConfigValidator::validate_training_config(&config).is_ok());

        config.features.num_features = 0;
        assert!(ConfigValidator::validate_training_config(&config).is_err());
    }

    #[test]
    fn test_error_messages_are_actionable() {
        let mut config = config();
        config.distillation.temperature = -1.0;

        let error_msg = ConfigValidator::validate(&config).unwrap_err().to_string();

        assert!(error_msg.contains("temperature"));
        assert!(error_msg.contains("recommended"));
        assert!(error_msg.contains('→'));
    }
}
