//! Prediction and training configuration parsing.
//!
//! Both commands read a YAML file; every numeric knob has a default so a
//! config only needs its paths.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use celldistill::align::{CoverageCheck, ImputePolicy, DEFAULT_COVERAGE_WARNING};
use celldistill::distill::{DistillationLoss, SecondRoundConfig};
use celldistill::partition::DEFAULT_CONFIDENCE_FRACTION;
use celldistill::preprocess::Preprocessor;
use celldistill::select::FeatureMethod;
use celldistill::train::TrainingConfig;
use celldistill_common::{CellDistillError, Result};

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(CellDistillError::ConfigNotFound { path: path.to_path_buf() });
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CellDistillError::io(format!("reading config file: {}", path.display()), e))?;
    parse_yaml(&content, path)
}

fn parse_yaml<T: serde::de::DeserializeOwned>(content: &str, path: &Path) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| CellDistillError::ConfigParsing {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Complete prediction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotateConfig {
    /// Trained reference model
    pub model: ModelConfig,
    /// Target dataset
    pub input: InputConfig,
    /// Where the prediction table goes
    #[serde(default)]
    pub output: OutputConfig,
    /// Plan selection and partitioning
    #[serde(default)]
    pub prediction: PredictionParams,
    /// Second-round models
    #[serde(default)]
    pub distillation: DistillationParams,
    /// Feature coverage policy
    #[serde(default)]
    pub coverage: CoverageParams,
    /// Upstream preprocessing
    #[serde(default)]
    pub preprocess: Preprocessor,
}

impl AnnotateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_yaml(path.as_ref())
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        parse_yaml(content, path)
    }

    /// Create a minimal configuration for testing.
    pub fn minimal(model_dir: impl Into<PathBuf>, input: impl Into<PathBuf>) -> Self {
        Self {
            model: ModelConfig { dir: model_dir.into() },
            input: InputConfig { path: input.into() },
            output: OutputConfig::default(),
            prediction: PredictionParams::default(),
            distillation: DistillationParams::default(),
            coverage: CoverageParams::default(),
            preprocess: Preprocessor::default(),
        }
    }

    /// `<output.dir>/<output.prefix>celltypes.csv`
    pub fn output_path(&self) -> PathBuf {
        self.output.dir.join(format!("{}celltypes.csv", self.output.prefix))
    }

    pub fn coverage_check(&self) -> CoverageCheck {
        CoverageCheck { warn_below: self.coverage.warn_below, fail_below: self.coverage.fail_below }
    }

    pub fn second_round(&self) -> SecondRoundConfig {
        let d = &self.distillation;
        SecondRoundConfig {
            hidden_dims: d.hidden_dims.clone(),
            teacher: TrainingConfig {
                epochs: d.teacher_epochs,
                batch_size: d.batch_size,
                learning_rate: d.learning_rate,
            },
            student: TrainingConfig { epochs: d.epochs, batch_size: d.batch_size, learning_rate: d.learning_rate },
            loss: DistillationLoss { temperature: d.temperature, alpha: d.alpha },
            min_confident_classes: d.min_confident_classes,
        }
    }
}

/// Reference model location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding features.txt, onehot_encoder.txt and the weights
    pub dir: PathBuf,
}

/// Input matrix location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Dense features × cells CSV/TSV
    pub path: PathBuf,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// File name prefix
    #[serde(default)]
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir(), prefix: String::new() }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./celldistill-output")
}

/// Single-round or two-round prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PredictType {
    /// First-round labels are final
    #[value(name = "direct_predict")]
    DirectPredict,
    /// Relabel uncertain cells with a self-distilled student
    #[default]
    #[value(name = "tworound_predict")]
    TworoundPredict,
}

/// Prediction plan and partitioning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionParams {
    #[serde(default)]
    pub predict_type: PredictType,
    /// Entropy quantile of each class treated as confident
    #[serde(default = "default_confidence_fraction")]
    pub confidence_fraction: f64,
    /// Seed of the run RNG
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            predict_type: PredictType::default(),
            confidence_fraction: default_confidence_fraction(),
            seed: default_seed(),
        }
    }
}

fn default_confidence_fraction() -> f64 {
    DEFAULT_CONFIDENCE_FRACTION
}

fn default_seed() -> u64 {
    1993
}

/// Second-round hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillationParams {
    /// Student epochs
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Weight of the hard-label loss
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Temperature for soft targets
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Teacher epochs
    #[serde(default = "default_epochs")]
    pub teacher_epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_lr")]
    pub learning_rate: f32,
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
    /// Distinct classes the confident set must contain
    #[serde(default = "default_min_confident_classes")]
    pub min_confident_classes: usize,
}

impl Default for DistillationParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            alpha: default_alpha(),
            temperature: default_temperature(),
            teacher_epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_lr(),
            hidden_dims: default_hidden_dims(),
            min_confident_classes: default_min_confident_classes(),
        }
    }
}

fn default_epochs() -> usize {
    30
}

fn default_alpha() -> f32 {
    0.1
}

fn default_temperature() -> f32 {
    3.0
}

fn default_batch_size() -> usize {
    32
}

fn default_lr() -> f32 {
    1e-3
}

fn default_hidden_dims() -> Vec<usize> {
    vec![64, 16]
}

fn default_min_confident_classes() -> usize {
    2
}

/// Feature coverage policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageParams {
    /// Coverage below which a warning is logged
    #[serde(default = "default_warn_below")]
    pub warn_below: f64,
    /// Optional hard minimum
    #[serde(default)]
    pub fail_below: Option<f64>,
    /// Fill for reference features the target lacks
    #[serde(default)]
    pub impute: ImputePolicy,
}

impl Default for CoverageParams {
    fn default() -> Self {
        Self { warn_below: default_warn_below(), fail_below: None, impute: ImputePolicy::default() }
    }
}

fn default_warn_below() -> f64 {
    DEFAULT_COVERAGE_WARNING
}

/// Reference training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Labelled reference matrix
    pub input: InputConfig,
    /// Cell-type annotations
    pub metadata: MetadataConfig,
    /// Where the trained model is written
    pub model: ModelConfig,
    #[serde(default)]
    pub features: FeatureSelection,
    #[serde(default)]
    pub training: TrainingParams,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub preprocess: Preprocessor,
}

impl TrainConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_yaml(path.as_ref())
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        parse_yaml(content, path)
    }

    /// Create a minimal configuration for testing.
    pub fn minimal(input: impl Into<PathBuf>, metadata: impl Into<PathBuf>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: InputConfig { path: input.into() },
            metadata: MetadataConfig { path: metadata.into(), celltype_column: default_celltype_column() },
            model: ModelConfig { dir: model_dir.into() },
            features: FeatureSelection::default(),
            training: TrainingParams::default(),
            seed: default_seed(),
            preprocess: Preprocessor::default(),
        }
    }

    pub fn schedule(&self) -> TrainingConfig {
        TrainingConfig {
            epochs: self.training.epochs,
            batch_size: self.training.batch_size,
            learning_rate: self.training.learning_rate,
        }
    }
}

/// Cell annotation table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub path: PathBuf,
    #[serde(default = "default_celltype_column")]
    pub celltype_column: String,
}

fn default_celltype_column() -> String {
    "celltype".to_string()
}

/// Reference feature selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelection {
    #[serde(default)]
    pub method: FeatureMethod,
    #[serde(default = "default_num_features")]
    pub num_features: usize,
}

impl Default for FeatureSelection {
    fn default() -> Self {
        Self { method: FeatureMethod::default(), num_features: default_num_features() }
    }
}

fn default_num_features() -> usize {
    3000
}

/// Reference classifier schedule and architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingParams {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_lr")]
    pub learning_rate: f32,
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_lr(),
            hidden_dims: default_hidden_dims(),
        }
    }
}
