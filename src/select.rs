//! Feature selection for reference training.
//!
//! One-way ANOVA per feature across the labelled classes:
//!
//! ```text
//! F = (SS_between / (k - 1)) / (SS_within / (N - k))
//! ```
//!
//! Undefined statistics count as 0; features with zero within-class spread
//! but different class means rank first.
//!
//! The label-free alternative ranks features by mean-binned normalized
//! dispersion (Seurat flavor) of the de-logged expression.

use std::collections::BTreeMap;

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::preprocess::ExpressionMatrix;

/// How reference features are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMethod {
    /// Keep the features with the largest ANOVA F statistic
    #[default]
    FTest,
    /// Keep the most highly variable features (normalized dispersion)
    Seurat,
    /// Keep every feature
    None,
}

/// Mean-expression bins used to normalize dispersions.
pub const DISPERSION_BINS: usize = 20;

/// F statistic of every column of `values` grouped by `labels`.
pub fn f_statistics(values: &Array2<f32>, labels: &[String]) -> Result<Vec<f64>> {
    if values.nrows() != labels.len() {
        return Err(CellDistillError::ShapeMismatch {
            expected: vec![labels.len(), values.ncols()],
            actual: values.shape().to_vec(),
        });
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        groups.entry(label.as_str()).or_default().push(row);
    }
    let k = groups.len();
    let n = labels.len();
    if k < 2 || n <= k {
        return Ok(vec![0.0; values.ncols()]);
    }

    let stats = values
        .axis_iter(Axis(1))
        .map(|col| {
            let grand_mean = col.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
            let mut between = 0.0;
            let mut within = 0.0;
            for rows in groups.values() {
                let mean = rows.iter().map(|&r| f64::from(col[r])).sum::<f64>() / rows.len() as f64;
                between += rows.len() as f64 * (mean - grand_mean).powi(2);
                within += rows.iter().map(|&r| (f64::from(col[r]) - mean).powi(2)).sum::<f64>();
            }

            let between = between / (k - 1) as f64;
            let within = within / (n - k) as f64;
            if within > 0.0 {
                between / within
            } else if between > 0.0 {
                f64::MAX
            } else {
                0.0
            }
        })
        .collect();
    Ok(stats)
}

/// Normalized dispersion of every column of log1p-normalized `values`.
///
/// Per feature, on `expm1(values)`: dispersion = variance / mean, then
/// `ln(dispersion)` is z-scored against the features in the same
/// equal-width bin of `ln(1 + mean)`. A feature alone in its bin scores 1.
/// Features with zero mean or zero variance are `None` and never selected.
pub fn normalized_dispersions(values: &Array2<f32>, n_bins: usize) -> Result<Vec<Option<f64>>> {
    let n = values.nrows();
    if n < 2 {
        return Err(CellDistillError::TooFewObservations { cells: n, features: values.ncols(), minimum: 2 });
    }
    let n_bins = n_bins.max(1);

    let (log_means, log_disps): (Vec<f64>, Vec<Option<f64>>) = values
        .axis_iter(Axis(1))
        .map(|col| {
            let counts: Vec<f64> = col.iter().map(|&v| f64::from(v).exp_m1()).collect();
            let mean = counts.iter().sum::<f64>() / n as f64;
            let var = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            let dispersion = if mean > 0.0 { var / mean } else { 0.0 };
            (mean.ln_1p(), (dispersion > 0.0).then(|| dispersion.ln()))
        })
        .unzip();

    let lo = log_means.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = log_means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / n_bins as f64;
    let bins: Vec<usize> = log_means
        .iter()
        .map(|&m| if width > 0.0 { (((m - lo) / width) as usize).min(n_bins - 1) } else { 0 })
        .collect();

    // mean and sample std of the defined log-dispersions in each bin
    let mut members: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
    for (bin, disp) in bins.iter().zip(&log_disps) {
        if let Some(d) = disp {
            members[*bin].push(*d);
        }
    }
    let stats: Vec<(f64, f64)> = members
        .iter()
        .map(|vals| {
            let mean = vals.iter().sum::<f64>() / vals.len().max(1) as f64;
            let std = if vals.len() > 1 {
                (vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (vals.len() - 1) as f64).sqrt()
            } else {
                f64::NAN
            };
            (mean, std)
        })
        .collect();

    Ok(bins
        .iter()
        .zip(&log_disps)
        .map(|(&bin, disp)| {
            let d = (*disp)?;
            let (mean, std) = stats[bin];
            if std.is_nan() {
                Some(1.0)
            } else if std > 0.0 {
                Some((d - mean) / std)
            } else {
                Some(0.0)
            }
        })
        .collect())
}

/// Keep the `num_features` top-scoring features under `method`, names sorted.
///
/// Every feature is kept when `method` is [`FeatureMethod::None`] or the
/// matrix has no more than `num_features` columns. `labels` are only read by
/// [`FeatureMethod::FTest`].
pub fn select_features(
    matrix: &ExpressionMatrix,
    labels: &[String],
    method: FeatureMethod,
    num_features: usize,
) -> Result<ExpressionMatrix> {
    let (stats, scored): (Vec<f64>, &str) = match method {
        _ if num_features >= matrix.n_features() => (Vec::new(), ""),
        FeatureMethod::None => (Vec::new(), ""),
        FeatureMethod::FTest => (f_statistics(&matrix.values, labels)?, "F-test"),
        FeatureMethod::Seurat => (
            normalized_dispersions(&matrix.values, DISPERSION_BINS)?
                .into_iter()
                .map(|d| d.unwrap_or(f64::NEG_INFINITY))
                .collect(),
            "normalized dispersion",
        ),
    };
    if scored.is_empty() {
        info!(features = matrix.n_features(), "feature selection skipped");
        return Ok(matrix.clone());
    }

    let mut ranked: Vec<usize> = (0..stats.len()).filter(|&i| stats[i] > f64::NEG_INFINITY).collect();
    ranked.sort_by(|&a, &b| stats[b].total_cmp(&stats[a]).then(a.cmp(&b)));
    ranked.truncate(num_features);
    ranked.sort_by(|&a, &b| matrix.features[a].cmp(&matrix.features[b]));

    info!(kept = ranked.len(), from = matrix.n_features(), method = scored, "selected features");
    Ok(matrix.select_features(&ranked))
}
