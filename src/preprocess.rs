//! Expression matrix cleaning, normalization and scaling.
//!
//! ```text
//! raw counts ─▶ clean names ─▶ drop ERCC*/MT-* ─▶ size check
//!            ─▶ per-cell total = target_sum ─▶ log1p
//! ```
//!
//! Centre-scaling is kept separate ([`Preprocessor::scale`]) because it has
//! to run on the final feature set: after alignment when predicting, after
//! feature selection when training.

use std::collections::HashSet;

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Feature-name prefixes of spike-in and mitochondrial controls.
const CONTROL_PREFIXES: [&str; 2] = ["ERCC", "MT-"];

/// Cells × features matrix with row and column identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    pub cells: Vec<String>,
    pub features: Vec<String>,
    /// [cells, features]
    pub values: Array2<f32>,
}

impl ExpressionMatrix {
    pub fn new(cells: Vec<String>, features: Vec<String>, values: Array2<f32>) -> Result<Self> {
        if values.dim() != (cells.len(), features.len()) {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![cells.len(), features.len()],
                actual: values.shape().to_vec(),
            });
        }
        Ok(Self { cells, features, values })
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Keep the given columns, in the given order.
    pub fn select_features(&self, columns: &[usize]) -> Self {
        Self {
            cells: self.cells.clone(),
            features: columns.iter().map(|&c| self.features[c].clone()).collect(),
            values: self.values.select(Axis(1), columns),
        }
    }

    /// Keep the given rows, in the given order.
    pub fn select_cells(&self, rows: &[usize]) -> Self {
        Self {
            cells: rows.iter().map(|&r| self.cells[r].clone()).collect(),
            features: self.features.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }
}

/// Append `-1`, `-2`, … to repeated names; the first occurrence is untouched.
pub fn make_unique(names: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = names.iter().cloned().collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        if seen.insert(name.as_str()) {
            out.push(name.clone());
            continue;
        }
        let mut k = 1;
        let renamed = loop {
            let candidate = format!("{name}-{k}");
            if !taken.contains(&candidate) {
                break candidate;
            }
            k += 1;
        };
        taken.insert(renamed.clone());
        out.push(renamed);
    }
    out
}

/// Upstream preprocessing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocessor {
    /// Minimum cells left after filtering
    pub min_cells: usize,
    /// Minimum features left after filtering
    pub min_features: usize,
    /// Per-cell total after normalization
    pub target_sum: f32,
    /// Clip bound of scaled values
    pub scale_max: f32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self { min_cells: 3, min_features: 3, target_sum: 1e4, scale_max: 6.0 }
    }
}

impl Preprocessor {
    /// Clean, filter, size-check, normalize and log-transform.
    pub fn run(&self, matrix: ExpressionMatrix) -> Result<ExpressionMatrix> {
        let matrix = self.filter_controls(&clean_feature_names(matrix));
        self.check_size(&matrix)?;
        let values = self.normalize_log1p(&matrix.values);
        info!(cells = matrix.n_cells(), features = matrix.n_features(), "preprocessed expression matrix");
        Ok(ExpressionMatrix { values, ..matrix })
    }

    /// Drop ERCC spike-ins and mitochondrial genes.
    pub fn filter_controls(&self, matrix: &ExpressionMatrix) -> ExpressionMatrix {
        let keep: Vec<usize> = matrix
            .features
            .iter()
            .enumerate()
            .filter(|(_, name)| !CONTROL_PREFIXES.iter().any(|p| name.starts_with(p)))
            .map(|(i, _)| i)
            .collect();
        debug!(removed = matrix.n_features() - keep.len(), "filtered control features");
        matrix.select_features(&keep)
    }

    pub fn check_size(&self, matrix: &ExpressionMatrix) -> Result<()> {
        if matrix.n_cells() < self.min_cells || matrix.n_features() < self.min_features {
            return Err(CellDistillError::TooFewObservations {
                cells: matrix.n_cells(),
                features: matrix.n_features(),
                minimum: self.min_cells.max(self.min_features),
            });
        }
        Ok(())
    }

    /// Scale every cell to `target_sum` total, then `ln(1 + x)`.
    ///
    /// Cells with zero total stay all-zero.
    pub fn normalize_log1p(&self, values: &Array2<f32>) -> Array2<f32> {
        let mut out = values.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            let total: f32 = row.sum();
            if total > 0.0 {
                let factor = self.target_sum / total;
                row.mapv_inplace(|v| (v * factor).ln_1p());
            }
        }
        out
    }

    /// Per-feature z-score (sample standard deviation), clipped to ±`scale_max`.
    ///
    /// Constant features become all-zero.
    pub fn scale(&self, values: &Array2<f32>) -> Array2<f32> {
        let n = values.nrows();
        let mut out = values.clone();
        for mut col in out.axis_iter_mut(Axis(1)) {
            let mean = col.sum() / n.max(1) as f32;
            let var = if n > 1 {
                col.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / (n - 1) as f32
            } else {
                0.0
            };
            let std = if var > 0.0 { var.sqrt() } else { 1.0 };
            let max = self.scale_max;
            col.mapv_inplace(|v| ((v - mean) / std).clamp(-max, max));
        }
        out
    }
}

/// Upper-case feature names, drop unnamed features, make names unique.
pub fn clean_feature_names(matrix: ExpressionMatrix) -> ExpressionMatrix {
    let named: Vec<usize> = matrix
        .features
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.trim().is_empty())
        .map(|(i, _)| i)
        .collect();
    let mut matrix = if named.len() == matrix.n_features() { matrix } else { matrix.select_features(&named) };

    let upper: Vec<String> = matrix.features.iter().map(|f| f.trim().to_uppercase()).collect();
    matrix.features = make_unique(&upper);
    matrix.cells = make_unique(&matrix.cells);
    matrix
}
