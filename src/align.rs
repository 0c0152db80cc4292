//! Feature alignment between a reference feature space and a target dataset.
//!
//! The reference model fixes an ordered list of feature identifiers at
//! training time. A target dataset arrives with its own (arbitrary) column
//! order, so every prediction starts by mapping reference position `i` to
//! the matching target column, or to "absent".
//!
//! Absent features are never dropped: the projected matrix always has the
//! reference width, and an [`ImputePolicy`] decides what fills the gaps.

use std::collections::HashMap;
use std::path::Path;

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Coverage below which predictions are reported as degraded.
pub const DEFAULT_COVERAGE_WARNING: f64 = 0.70;

/// Ordered, upper-cased, deduplicated feature identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpace {
    names: Vec<String>,
}

impl FeatureSpace {
    /// Normalize identifiers: upper-case, trim, drop empties, keep first occurrence.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_uppercase())
            .filter(|n| !n.is_empty())
            .filter(|n| seen.insert(n.clone()))
            .collect();
        Self { names }
    }

    /// Read a feature list (one identifier per line).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CellDistillError::ModelFileMissing {
                path: path.to_path_buf(),
                what: "reference feature list".into(),
            });
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CellDistillError::io(format!("reading {}", path.display()), e))?;
        Ok(Self::new(content.lines()))
    }

    /// Write one identifier per line.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut content = self.names.join("\n");
        content.push('\n');
        std::fs::write(path, content)
            .map_err(|e| CellDistillError::io(format!("writing {}", path.display()), e))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// What to put in a reference column that the target does not measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputePolicy {
    /// Fill the column with zeros
    #[default]
    Zero,
    /// Refuse to project when any reference feature is absent
    Fail,
}

/// Reference position → target column mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentIndex {
    positions: Vec<Option<usize>>,
}

impl AlignmentIndex {
    /// Match every reference feature against the target by exact equality.
    ///
    /// Target names are expected to be unique and case-normalized already;
    /// if duplicates slip through, the first matching column wins.
    pub fn build(reference: &FeatureSpace, target: &[String]) -> Self {
        let mut lookup: HashMap<&str, usize> = HashMap::with_capacity(target.len());
        for (col, name) in target.iter().enumerate() {
            lookup.entry(name.as_str()).or_insert(col);
        }

        let positions =
            reference.names().iter().map(|name| lookup.get(name.as_str()).copied()).collect();
        Self { positions }
    }

    /// One entry per reference feature; `None` is the not-found sentinel.
    pub fn positions(&self) -> &[Option<usize>] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of reference features found in the target.
    pub fn matched(&self) -> usize {
        self.positions.iter().filter(|p| p.is_some()).count()
    }

    /// matched / reference count (0 for an empty reference).
    pub fn coverage(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.matched() as f64 / self.positions.len() as f64
    }

    /// Reference positions with no target column.
    pub fn missing(&self) -> Vec<usize> {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.is_none().then_some(i))
            .collect()
    }

    /// Re-project a cells × target-features matrix onto the reference order.
    pub fn project(
        &self,
        target: &Array2<f32>,
        reference: &FeatureSpace,
        policy: ImputePolicy,
    ) -> Result<Array2<f32>> {
        let missing = self.missing();
        if policy == ImputePolicy::Fail && !missing.is_empty() {
            return Err(CellDistillError::MissingFeatures {
                missing: missing.len(),
                first: reference.names()[missing[0]].clone(),
            });
        }

        let mut projected = Array2::<f32>::zeros((target.nrows(), self.positions.len()));
        for (ref_col, position) in self.positions.iter().enumerate() {
            if let Some(src) = position {
                if *src >= target.ncols() {
                    return Err(CellDistillError::ShapeMismatch {
                        expected: vec![target.nrows(), src + 1],
                        actual: target.shape().to_vec(),
                    });
                }
                projected.column_mut(ref_col).assign(&target.index_axis(Axis(1), *src));
            }
        }
        Ok(projected)
    }
}

/// Coverage thresholds: a soft warning level and an optional hard floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageCheck {
    pub warn_below: f64,
    pub fail_below: Option<f64>,
}

impl Default for CoverageCheck {
    fn default() -> Self {
        Self { warn_below: DEFAULT_COVERAGE_WARNING, fail_below: None }
    }
}

/// Outcome of a coverage check that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageStatus {
    Adequate,
    Degraded,
}

impl CoverageCheck {
    /// Log coverage and fail only when a hard minimum is configured and missed.
    pub fn evaluate(&self, index: &AlignmentIndex) -> Result<CoverageStatus> {
        let coverage = index.coverage();
        if let Some(minimum) = self.fail_below {
            if coverage < minimum {
                return Err(CellDistillError::LowCoverage {
                    coverage,
                    minimum,
                    matched: index.matched(),
                    total: index.len(),
                });
            }
        }

        if coverage < self.warn_below {
            warn!(
                coverage,
                matched = index.matched(),
                total = index.len(),
                "common feature space between reference and target is small; predictions may be inaccurate"
            );
            Ok(CoverageStatus::Degraded)
        } else {
            info!(coverage, matched = index.matched(), total = index.len(), "feature coverage");
            Ok(CoverageStatus::Adequate)
        }
    }
}
