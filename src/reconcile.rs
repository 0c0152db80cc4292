//! Merge first-round and second-round labels into one final labeling.
//!
//! Low-tier cells keep their first-round label. High-tier cells take the
//! student's top-class label. Each cell ends up with exactly one final label.

use std::collections::HashMap;

use celldistill_common::{CellDistillError, Result};
use tracing::info;

use crate::cells::{CellRecord, CellTable};
use crate::partition::ConfidenceTier;

/// Assign final labels.
///
/// `relabeled` holds the table positions of the high-tier cells and
/// `labels` their second-round labels, in the same order.
pub fn reconcile(table: &CellTable, relabeled: &[usize], labels: &[String]) -> Result<CellTable> {
    if relabeled.len() != labels.len() {
        return Err(CellDistillError::ShapeMismatch { expected: vec![relabeled.len()], actual: vec![labels.len()] });
    }
    let second_round: HashMap<usize, &String> = relabeled.iter().copied().zip(labels).collect();
    if second_round.len() != relabeled.len() {
        return Err(CellDistillError::Internal { message: "a cell was relabelled twice in the second round".into() });
    }

    let mut changed = 0usize;
    let mut records = Vec::with_capacity(table.len());
    for (i, record) in table.records().iter().enumerate() {
        let first_round = record.first_round.as_ref().ok_or_else(|| missing(record, "first-round label"))?;
        let final_label = match (record.tier, second_round.get(&i)) {
            (Some(ConfidenceTier::Low), None) => first_round.clone(),
            (Some(ConfidenceTier::High), Some(&label)) => {
                if label != first_round {
                    changed += 1;
                }
                label.clone()
            }
            (Some(ConfidenceTier::Low), Some(_)) => {
                return Err(CellDistillError::Internal {
                    message: format!("low-tier cell '{}' was relabelled", record.id),
                })
            }
            (Some(ConfidenceTier::High), None) => {
                return Err(missing(record, "second-round label"));
            }
            (None, _) => return Err(missing(record, "confidence tier")),
        };
        records.push(final_label);
    }

    info!(
        cells = table.len(),
        relabelled = relabeled.len(),
        changed,
        "reconciled first- and second-round labels"
    );
    table.with_final_labels(&records)
}

fn missing(record: &CellRecord, what: &str) -> CellDistillError {
    CellDistillError::Internal { message: format!("cell '{}' has no {what}", record.id) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tiered(first: &[&str], tiers: &[ConfidenceTier]) -> CellTable {
        let ids: Vec<String> = (0..first.len()).map(|i| format!("cell{i}")).collect();
        CellTable::from_ids(ids)
            .with_first_round(&strings(first), &vec![0.5; first.len()])
            .unwrap()
            .with_tiers(tiers)
            .unwrap()
    }

    #[test]
    fn test_low_keeps_first_round_high_takes_second() {
        use ConfidenceTier::{High, Low};
        let table = tiered(&["T", "T", "B", "NK"], &[Low, High, Low, High]);

        let out = reconcile(&table, &[1, 3], &strings(&["B", "NK"])).unwrap();
        let finals: Vec<&str> = out.records().iter().map(|r| r.final_label.as_deref().unwrap()).collect();
        assert_eq!(finals, vec!["T", "B", "B", "NK"]);
    }

    #[test]
    fn test_no_high_cells_keeps_everything() {
        let table = tiered(&["T", "B"], &[ConfidenceTier::Low, ConfidenceTier::Low]);
        let out = reconcile(&table, &[], &[]).unwrap();
        assert_eq!(out.records()[1].final_label.as_deref(), Some("B"));
    }

    #[test]
    fn test_unlabelled_high_cell_rejected() {
        let table = tiered(&["T", "B"], &[ConfidenceTier::Low, ConfidenceTier::High]);
        assert!(reconcile(&table, &[], &[]).is_err());
    }

    #[test]
    fn test_relabelled_low_cell_rejected() {
        let table = tiered(&["T", "B"], &[ConfidenceTier::Low, ConfidenceTier::High]);
        assert!(reconcile(&table, &[0, 1], &strings(&["B", "B"])).is_err());
    }

    #[test]
    fn test_duplicate_relabel_rejected() {
        let table = tiered(&["T", "B"], &[ConfidenceTier::High, ConfidenceTier::High]);
        assert!(reconcile(&table, &[1, 1], &strings(&["B", "T"])).is_err());
    }

    proptest! {
        #[test]
        fn prop_one_final_label_per_cell(
            cells in proptest::collection::vec((0u8..3, any::<bool>(), 0u8..3), 1..40)
        ) {
            let first: Vec<String> = cells.iter().map(|(f, _, _)| format!("c{f}")).collect();
            let tiers: Vec<ConfidenceTier> = cells
                .iter()
                .map(|(_, low, _)| if *low { ConfidenceTier::Low } else { ConfidenceTier::High })
                .collect();
            let ids: Vec<String> = (0..cells.len()).map(|i| format!("cell{i}")).collect();
            let table = CellTable::from_ids(ids)
                .with_first_round(&first, &vec![0.0; cells.len()])
                .unwrap()
                .with_tiers(&tiers)
                .unwrap();

            let high: Vec<usize> = (0..cells.len()).filter(|&i| tiers[i] == ConfidenceTier::High).collect();
            let second: Vec<String> = high.iter().map(|&i| format!("c{}", cells[i].2)).collect();
            let out = reconcile(&table, &high, &second).unwrap();

            prop_assert_eq!(out.len(), cells.len());
            for (i, record) in out.records().iter().enumerate() {
                prop_assert!(record.final_label.is_some());
                if tiers[i] == ConfidenceTier::Low {
                    prop_assert_eq!(&record.final_label, &record.first_round);
                }
            }
        }
    }
}
