//! Per-cell prediction records.
//!
//! Every pipeline stage takes a [`CellTable`] by reference and returns a new
//! one with its own columns filled, so no stage can see a half-updated table.

use celldistill_common::{CellDistillError, Result};
use serde::{Deserialize, Serialize};

use crate::partition::ConfidenceTier;

/// One target cell and everything derived for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: String,
    pub first_round: Option<String>,
    pub entropy: Option<f32>,
    pub tier: Option<ConfidenceTier>,
    pub final_label: Option<String>,
}

impl CellRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), first_round: None, entropy: None, tier: None, final_label: None }
    }
}

/// Cell records in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellTable {
    records: Vec<CellRecord>,
}

impl CellTable {
    /// Empty records for the given identifiers.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { records: ids.into_iter().map(CellRecord::new).collect() }
    }

    pub fn records(&self) -> &[CellRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.records.len() {
            return Err(CellDistillError::ShapeMismatch { expected: vec![self.records.len()], actual: vec![got] });
        }
        Ok(())
    }

    /// Attach first-round labels and entropies.
    pub fn with_first_round(&self, labels: &[String], entropy: &[f32]) -> Result<Self> {
        self.check_len(labels.len())?;
        self.check_len(entropy.len())?;
        let records = self
            .records
            .iter()
            .zip(labels.iter().zip(entropy))
            .map(|(r, (label, &h))| CellRecord { first_round: Some(label.clone()), entropy: Some(h), ..r.clone() })
            .collect();
        Ok(Self { records })
    }

    /// Attach confidence tiers.
    pub fn with_tiers(&self, tiers: &[ConfidenceTier]) -> Result<Self> {
        self.check_len(tiers.len())?;
        let records = self
            .records
            .iter()
            .zip(tiers)
            .map(|(r, &tier)| CellRecord { tier: Some(tier), ..r.clone() })
            .collect();
        Ok(Self { records })
    }

    /// Set final labels directly (single-round prediction).
    pub fn with_final_labels(&self, labels: &[String]) -> Result<Self> {
        self.check_len(labels.len())?;
        let records = self
            .records
            .iter()
            .zip(labels)
            .map(|(r, label)| CellRecord { final_label: Some(label.clone()), ..r.clone() })
            .collect();
        Ok(Self { records })
    }

    /// First-round labels, failing if any cell has none.
    pub fn first_round_labels(&self) -> Result<Vec<String>> {
        self.records
            .iter()
            .map(|r| {
                r.first_round.clone().ok_or_else(|| CellDistillError::Internal {
                    message: format!("cell '{}' has no first-round label", r.id),
                })
            })
            .collect()
    }

    /// Entropies, failing if any cell has none.
    pub fn entropies(&self) -> Result<Vec<f32>> {
        self.records
            .iter()
            .map(|r| {
                r.entropy.ok_or_else(|| CellDistillError::Internal {
                    message: format!("cell '{}' has no entropy score", r.id),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stages_return_new_tables() {
        let empty = CellTable::from_ids(["c1", "c2"]);
        let scored = empty.with_first_round(&strings(&["T", "B"]), &[0.1, 0.9]).unwrap();
        let tiered = scored.with_tiers(&[ConfidenceTier::Low, ConfidenceTier::High]).unwrap();

        assert!(empty.records().iter().all(|r| r.first_round.is_none()));
        assert!(scored.records().iter().all(|r| r.tier.is_none()));
        assert_eq!(tiered.records()[1].tier, Some(ConfidenceTier::High));
        assert_eq!(tiered.records()[1].first_round.as_deref(), Some("B"));
        assert_eq!(tiered.entropies().unwrap(), vec![0.1, 0.9]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let table = CellTable::from_ids(["c1", "c2"]);
        assert!(table.with_first_round(&strings(&["T"]), &[0.1]).is_err());
        assert!(table.with_tiers(&[ConfidenceTier::Low]).is_err());
    }

    #[test]
    fn test_missing_first_round_reported() {
        let table = CellTable::from_ids(["c1"]);
        assert!(matches!(table.first_round_labels(), Err(CellDistillError::Internal { .. })));
    }
}
