//! Prediction table output

use std::path::Path;

use ::csv::Writer;
use celldistill_common::{CellDistillError, Result};

use crate::cells::CellTable;

/// Column names of the written prediction table.
pub const CELL_TABLE_HEADER: [&str; 5] =
    ["cell", "firstround_pred_celltype", "entropy", "entropy_status", "pred_celltype"];

/// Write one row per cell; fields a stage did not produce are left empty.
pub fn write_cell_table(path: impl AsRef<Path>, table: &CellTable) -> Result<()> {
    let path = path.as_ref();
    let csv_err = |e: ::csv::Error| CellDistillError::Serialization {
        message: format!("writing {}: {e}", path.display()),
    };

    let mut writer = Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(CELL_TABLE_HEADER).map_err(csv_err)?;
    for record in table.records() {
        let entropy = record.entropy.map(|h| h.to_string()).unwrap_or_default();
        let tier = record.tier.map(|t| t.as_str()).unwrap_or_default();
        writer
            .write_record([
                record.id.as_str(),
                record.first_round.as_deref().unwrap_or_default(),
                entropy.as_str(),
                tier,
                record.final_label.as_deref().unwrap_or_default(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|e| CellDistillError::io(format!("flushing {}", path.display()), e))
}
