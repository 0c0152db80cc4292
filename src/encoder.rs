//! Bijective mapping between model output indices and cell-type labels.
//!
//! The mapping is fixed when the reference model is trained, persisted as
//! `index:label` lines, and reused unchanged for every prediction.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use celldistill_common::{CellDistillError, Result};
use ndarray::Array2;

use crate::entropy::argmax_rows;

/// Index ⇄ label bijection, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    labels: Vec<String>,
    indices: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Build from labels in index order; labels must be unique.
    pub fn new(labels: Vec<String>) -> Result<Self> {
        let mut indices = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if indices.insert(label.clone(), i).is_some() {
                return Err(CellDistillError::MalformedEncoder {
                    line: i + 1,
                    message: format!("duplicate label '{label}'"),
                });
            }
        }
        Ok(Self { labels, indices })
    }

    /// Sorted distinct training labels, indexed in that order.
    pub fn from_training_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let distinct: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        Self::new(distinct.into_iter().map(str::to_string).collect())
    }

    /// Parse `index:label` lines. Indices must be exactly `0..n`.
    pub fn from_lines(content: &str) -> Result<Self> {
        let mut slots: Vec<Option<String>> = Vec::new();
        let mut count = 0usize;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let lineno = lineno + 1;
            let (index, label) = line.split_once(':').ok_or_else(|| {
                CellDistillError::MalformedEncoder {
                    line: lineno,
                    message: format!("missing ':' separator in '{line}'"),
                }
            })?;
            let index: usize = index.trim().parse().map_err(|_| {
                CellDistillError::MalformedEncoder {
                    line: lineno,
                    message: format!("index '{}' is not a non-negative integer", index.trim()),
                }
            })?;

            if index >= slots.len() {
                slots.resize(index + 1, None);
            }
            if slots[index].is_some() {
                return Err(CellDistillError::MalformedEncoder {
                    line: lineno,
                    message: format!("duplicate index {index}"),
                });
            }
            slots[index] = Some(label.to_string());
            count += 1;
        }

        if count != slots.len() {
            let gap = slots.iter().position(Option::is_none).unwrap_or(0);
            return Err(CellDistillError::MalformedEncoder {
                line: 0,
                message: format!("indices are not contiguous: {gap} is missing"),
            });
        }

        let labels: Vec<String> = slots.into_iter().flatten().collect();
        Self::new(labels)
    }

    /// Load from an encoder mapping file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CellDistillError::ModelFileMissing {
                path: path.to_path_buf(),
                what: "encoder mapping".into(),
            });
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CellDistillError::io(format!("reading {}", path.display()), e))?;
        Self::from_lines(&content)
    }

    /// Render as `index:label` lines.
    pub fn to_lines(&self) -> String {
        self.labels.iter().enumerate().map(|(i, l)| format!("{i}:{l}\n")).collect()
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_lines())
            .map_err(|e| CellDistillError::io(format!("writing {}", path.display()), e))
    }

    /// Forward lookup: index → label.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Inverse lookup: label → index.
    pub fn index(&self, label: &str) -> Option<usize> {
        self.indices.get(label).copied()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Encode labels as indices, failing on any label outside the mapping.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| {
                self.index(l.as_ref()).ok_or_else(|| CellDistillError::ConfigValue {
                    field: "labels".into(),
                    message: format!("label '{}' is not in the encoder mapping", l.as_ref()),
                    suggestion: "Retrain the reference model with this cell type".into(),
                })
            })
            .collect()
    }

    /// One-hot matrix [labels, classes] for the given labels.
    pub fn one_hot<S: AsRef<str>>(&self, labels: &[S]) -> Result<Array2<f32>> {
        let indices = self.encode(labels)?;
        let mut onehot = Array2::zeros((indices.len(), self.len()));
        for (row, &col) in indices.iter().enumerate() {
            onehot[[row, col]] = 1.0;
        }
        Ok(onehot)
    }

    /// Top-class label of each probability row.
    pub fn decode(&self, probs: &Array2<f32>) -> Result<Vec<String>> {
        if probs.ncols() != self.len() {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![probs.nrows(), self.len()],
                actual: probs.shape().to_vec(),
            });
        }
        Ok(argmax_rows(probs).into_iter().map(|i| self.labels[i].clone()).collect())
    }
}
