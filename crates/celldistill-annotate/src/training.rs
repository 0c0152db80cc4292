//! Reference model training.
//!
//! Builds the model directory that [`crate::Pipeline`] predicts with: the
//! selected feature order, the label mapping and the fitted classifier.

use std::path::PathBuf;

use celldistill::align::FeatureSpace;
use celldistill::encoder::LabelEncoder;
use celldistill::io::{load_dense_csv, load_metadata_column};
use celldistill::mlp::{Mlp, MlpConfig};
use celldistill::reference::{ModelMetadata, ReferenceModel};
use celldistill::select::select_features;
use celldistill::train::{fit_supervised, TrainingMetrics};
use celldistill_common::{CellDistillError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::config::TrainConfig;

/// Reference training result.
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Directory the model was written to
    pub model_dir: PathBuf,
    pub cells: usize,
    pub features: usize,
    pub classes: usize,
    pub metrics: TrainingMetrics,
}

/// Train a reference classifier and save it to `config.model.dir`.
pub fn train_reference(config: &TrainConfig) -> Result<TrainResult> {
    let matrix = load_dense_csv(&config.input.path)?;
    let annotations = load_metadata_column(&config.metadata.path, &config.metadata.celltype_column)?;

    let labelled: Vec<usize> =
        (0..matrix.n_cells()).filter(|&i| annotations.contains_key(&matrix.cells[i])).collect();
    if labelled.len() < matrix.n_cells() {
        warn!(
            unlabelled = matrix.n_cells() - labelled.len(),
            kept = labelled.len(),
            "dropping cells without a cell-type annotation"
        );
    }
    if labelled.is_empty() {
        return Err(CellDistillError::MalformedData {
            path: config.metadata.path.clone(),
            message: "no cell identifier of the expression matrix has an annotation".into(),
        });
    }
    let matrix = config.preprocess.run(matrix.select_cells(&labelled))?;

    let labels: Vec<String> = matrix
        .cells
        .iter()
        .map(|cell| {
            annotations.get(cell).cloned().ok_or_else(|| CellDistillError::Internal {
                message: format!("cell '{cell}' lost its annotation during preprocessing"),
            })
        })
        .collect::<Result<_>>()?;

    let selected = select_features(&matrix, &labels, config.features.method, config.features.num_features)?;
    let x = config.preprocess.scale(&selected.values);

    let encoder = LabelEncoder::from_training_labels(&labels)?;
    let targets = encoder.one_hot(&labels)?;
    let features = FeatureSpace::new(&selected.features);
    if features.len() != selected.n_features() {
        return Err(CellDistillError::Internal {
            message: format!("{} selected features collapsed to {} names", selected.n_features(), features.len()),
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let architecture = MlpConfig::new(features.len(), &config.training.hidden_dims, encoder.len());
    let mut classifier = Mlp::new(architecture.clone(), &mut rng);
    let metrics = fit_supervised(&mut classifier, &x, &targets, &config.schedule(), &mut rng)?;
    info!(
        cells = x.nrows(),
        features = features.len(),
        classes = encoder.len(),
        initial_loss = metrics.initial_loss,
        final_loss = metrics.final_loss,
        "reference classifier trained"
    );

    let metadata = ModelMetadata::new(architecture, x.nrows(), config.seed, Some(metrics.clone()));
    let model = ReferenceModel::new(features, encoder, classifier, metadata)?;
    model.save(&config.model.dir)?;

    Ok(TrainResult {
        model_dir: config.model.dir.clone(),
        cells: x.nrows(),
        features: model.features.len(),
        classes: model.encoder.len(),
        metrics,
    })
}
