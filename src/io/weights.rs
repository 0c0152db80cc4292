//! SafeTensors storage of classifier weights.
//!
//! Layer `i` is stored as `layers.{i}.weight` ([fan_in, fan_out]) and
//! `layers.{i}.bias` ([fan_out]), all F32. The architecture itself lives in
//! a JSON sidecar written by the caller.

use std::collections::HashMap;
use std::path::Path;

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array1, Array2};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::mlp::{Dense, Mlp, MlpConfig};

/// Save every layer of `mlp`, with `metadata` in the SafeTensors header.
#[allow(clippy::implicit_hasher)]
pub fn save_mlp_weights(mlp: &Mlp, metadata: HashMap<String, String>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    let tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = mlp
        .layers()
        .iter()
        .enumerate()
        .flat_map(|(i, layer)| {
            let weight: Vec<f32> = layer.weight.iter().copied().collect();
            let bias: Vec<f32> = layer.bias.iter().copied().collect();
            [
                (format!("layers.{i}.weight"), bytemuck::cast_slice::<f32, u8>(&weight).to_vec(), layer.weight.shape().to_vec()),
                (format!("layers.{i}.bias"), bytemuck::cast_slice::<f32, u8>(&bias).to_vec(), layer.bias.shape().to_vec()),
            ]
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| CellDistillError::Serialization { message: format!("tensor '{name}': {e}") })
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, Some(metadata))
        .map_err(|e| CellDistillError::Serialization { message: e.to_string() })?;
    std::fs::write(path, bytes).map_err(|e| CellDistillError::io(format!("writing {}", path.display()), e))
}

/// Load layers saved by [`save_mlp_weights`] into an [`Mlp`] of shape `config`.
pub fn load_mlp_weights(path: impl AsRef<Path>, config: MlpConfig) -> Result<Mlp> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CellDistillError::ModelFileMissing {
            path: path.to_path_buf(),
            what: "classifier weights".into(),
        });
    }
    let data = std::fs::read(path).map_err(|e| CellDistillError::io(format!("reading {}", path.display()), e))?;
    let tensors = SafeTensors::deserialize(&data).map_err(|e| CellDistillError::Serialization {
        message: format!("invalid SafeTensors file {}: {e}", path.display()),
    })?;

    let mut layers = Vec::with_capacity(config.layer_shapes().len());
    for (i, &(fan_in, fan_out)) in config.layer_shapes().iter().enumerate() {
        let weight = read_f32(&tensors, &format!("layers.{i}.weight"))?;
        let bias = read_f32(&tensors, &format!("layers.{i}.bias"))?;

        let weight = Array2::from_shape_vec((fan_in, fan_out), weight).map_err(|_| {
            CellDistillError::ShapeMismatch { expected: vec![fan_in, fan_out], actual: tensor_shape(&tensors, i, "weight") }
        })?;
        let bias = Array1::from_vec(bias);
        layers.push(Dense { weight, bias });
    }

    Mlp::from_layers(config, layers)
}

fn read_f32(tensors: &SafeTensors<'_>, name: &str) -> Result<Vec<f32>> {
    let tensor = tensors
        .tensor(name)
        .map_err(|e| CellDistillError::Serialization { message: format!("failed to read tensor '{name}': {e}") })?;
    if tensor.dtype() != Dtype::F32 {
        return Err(CellDistillError::Serialization {
            message: format!("tensor '{name}' has dtype {:?}, expected F32", tensor.dtype()),
        });
    }
    // the buffer is not guaranteed to be 4-byte aligned
    Ok(tensor
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn tensor_shape(tensors: &SafeTensors<'_>, layer: usize, kind: &str) -> Vec<usize> {
    tensors.tensor(&format!("layers.{layer}.{kind}")).map(|t| t.shape().to_vec()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn mlp() -> Mlp {
        Mlp::new(MlpConfig::new(5, &[4, 3], 2), &mut StdRng::seed_from_u64(1993))
    }

    #[test]
    fn test_save_load_preserves_weights() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.safetensors");
        let original = mlp();

        save_mlp_weights(&original, HashMap::new(), &path).unwrap();
        let loaded = load_mlp_weights(&path, original.config().clone()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_tensor_names_and_header_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.safetensors");
        let mut metadata = HashMap::new();
        metadata.insert("n_classes".to_string(), "2".to_string());
        save_mlp_weights(&mlp(), metadata, &path).unwrap();

        let data = std::fs::read(&path).unwrap();
        let loaded = SafeTensors::deserialize(&data).unwrap();
        assert_eq!(loaded.len(), 6);
        assert_eq!(loaded.tensor("layers.0.weight").unwrap().shape(), &[5, 4]);
        assert_eq!(loaded.tensor("layers.2.bias").unwrap().shape(), &[2]);

        let (_, st_meta) = SafeTensors::read_metadata(&data).unwrap();
        assert_eq!(st_meta.metadata().as_ref().unwrap().get("n_classes").unwrap(), "2");
    }

    #[test]
    fn test_wrong_architecture_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.safetensors");
        save_mlp_weights(&mlp(), HashMap::new(), &path).unwrap();

        let err = load_mlp_weights(&path, MlpConfig::new(6, &[4, 3], 2)).unwrap_err();
        assert!(matches!(err, CellDistillError::ShapeMismatch { .. }));
        assert!(load_mlp_weights(&path, MlpConfig::new(5, &[4, 3, 2], 2)).is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_mlp_weights("/nonexistent/model.safetensors", MlpConfig::new(1, &[], 1)).unwrap_err();
        assert!(matches!(err, CellDistillError::ModelFileMissing { .. }));
    }

    #[test]
    fn test_invalid_data_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();
        assert!(matches!(
            load_mlp_weights(&path, MlpConfig::new(1, &[], 1)),
            Err(CellDistillError::Serialization { .. })
        ));
    }
}
