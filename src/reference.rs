//! Trained reference model directory.
//!
//! ```text
//! <dir>/
//!   features.txt          reference feature order, one per line
//!   onehot_encoder.txt    index:label mapping
//!   model.safetensors     classifier weights
//!   model_metadata.json   architecture and training summary
//! ```

use std::collections::HashMap;
use std::path::Path;

use celldistill_common::{CellDistillError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::align::FeatureSpace;
use crate::encoder::LabelEncoder;
use crate::io::{load_mlp_weights, save_mlp_weights};
use crate::mlp::{Classifier, Mlp, MlpConfig};
use crate::train::TrainingMetrics;

pub const FEATURES_FILE: &str = "features.txt";
pub const ENCODER_FILE: &str = "onehot_encoder.txt";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const METADATA_FILE: &str = "model_metadata.json";

const FORMAT_VERSION: u32 = 1;

/// Sidecar describing how the stored weights were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,
    pub architecture: MlpConfig,
    pub trained_cells: usize,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingMetrics>,
}

/// First-round classifier with the feature order and labels it was trained on.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    pub features: FeatureSpace,
    pub encoder: LabelEncoder,
    pub classifier: Mlp,
    pub metadata: ModelMetadata,
}

impl ReferenceModel {
    /// Bundle a trained classifier, checking that all parts agree on shape.
    pub fn new(features: FeatureSpace, encoder: LabelEncoder, classifier: Mlp, metadata: ModelMetadata) -> Result<Self> {
        let config = classifier.config();
        if config.input_dim != features.len() || config.n_classes != encoder.len() {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![features.len(), encoder.len()],
                actual: vec![config.input_dim, config.n_classes],
            });
        }
        Ok(Self { features, encoder, classifier, metadata })
    }

    /// Load a model directory written by [`ReferenceModel::save`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let features = FeatureSpace::from_file(dir.join(FEATURES_FILE))?;
        let encoder = LabelEncoder::from_file(dir.join(ENCODER_FILE))?;

        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(CellDistillError::ModelFileMissing {
                path: metadata_path,
                what: "model metadata".into(),
            });
        }
        let content = std::fs::read_to_string(&metadata_path)
            .map_err(|e| CellDistillError::io(format!("reading {}", metadata_path.display()), e))?;
        let metadata: ModelMetadata = serde_json::from_str(&content).map_err(|e| CellDistillError::Serialization {
            message: format!("{}: {e}", metadata_path.display()),
        })?;

        let classifier = load_mlp_weights(dir.join(WEIGHTS_FILE), metadata.architecture.clone())?;
        let model = Self::new(features, encoder, classifier, metadata)?;
        info!(
            dir = %dir.display(),
            features = model.features.len(),
            classes = model.encoder.len(),
            "loaded reference model"
        );
        Ok(model)
    }

    /// Write all four files into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CellDistillError::io(format!("creating {}", dir.display()), e))?;

        self.features.write(dir.join(FEATURES_FILE))?;
        self.encoder.write(dir.join(ENCODER_FILE))?;

        let mut header = HashMap::new();
        header.insert("format_version".to_string(), FORMAT_VERSION.to_string());
        header.insert("n_classes".to_string(), self.encoder.len().to_string());
        save_mlp_weights(&self.classifier, header, dir.join(WEIGHTS_FILE))?;

        let json = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| CellDistillError::Serialization { message: e.to_string() })?;
        let metadata_path = dir.join(METADATA_FILE);
        std::fs::write(&metadata_path, json)
            .map_err(|e| CellDistillError::io(format!("writing {}", metadata_path.display()), e))?;

        info!(dir = %dir.display(), parameters = self.classifier.num_parameters(), "saved reference model");
        Ok(())
    }
}

impl ModelMetadata {
    pub fn new(architecture: MlpConfig, trained_cells: usize, seed: u64, training: Option<TrainingMetrics>) -> Self {
        Self { format_version: FORMAT_VERSION, architecture, trained_cells, seed, training }
    }
}

impl Classifier for ReferenceModel {
    fn n_features(&self) -> usize {
        self.classifier.n_features()
    }

    fn n_classes(&self) -> usize {
        self.classifier.n_classes()
    }

    fn logits(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.classifier.logits(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn model() -> ReferenceModel {
        let features = FeatureSpace::new(["CD3E", "MS4A1", "LYZ"]);
        let encoder = LabelEncoder::new(vec!["B".into(), "Mono".into(), "T".into()]).unwrap();
        let config = MlpConfig::new(3, &[4], 3);
        let classifier = Mlp::new(config.clone(), &mut StdRng::seed_from_u64(1993));
        ReferenceModel::new(features, encoder, classifier, ModelMetadata::new(config, 10, 1993, None)).unwrap()
    }

    #[test]
    fn test_save_then_load_predicts_identically() {
        let tmp = TempDir::new().unwrap();
        let original = model();
        original.save(tmp.path()).unwrap();

        for file in [FEATURES_FILE, ENCODER_FILE, WEIGHTS_FILE, METADATA_FILE] {
            assert!(tmp.path().join(file).exists(), "{file} missing");
        }

        let loaded = ReferenceModel::load(tmp.path()).unwrap();
        assert_eq!(loaded.features, original.features);
        assert_eq!(loaded.encoder, original.encoder);
        assert_eq!(loaded.metadata, original.metadata);

        let x = array![[1.0, 0.0, 2.0]];
        assert_eq!(loaded.predict_proba(&x).unwrap(), original.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_missing_encoder_is_configuration_error() {
        let tmp = TempDir::new().unwrap();
        model().save(tmp.path()).unwrap();
        std::fs::remove_file(tmp.path().join(ENCODER_FILE)).unwrap();

        let err = ReferenceModel::load(tmp.path()).unwrap_err();
        assert!(matches!(err, CellDistillError::ModelFileMissing { .. }));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_mismatched_parts_rejected() {
        let m = model();
        let narrow = FeatureSpace::new(["CD3E"]);
        assert!(ReferenceModel::new(narrow, m.encoder, m.classifier, m.metadata).is_err());
    }
}
