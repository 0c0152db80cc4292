//! Cell metadata loading

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use ::csv::ReaderBuilder;
use celldistill_common::{CellDistillError, Result};

use super::delimiter_for;

/// Read one named column of a metadata table indexed by cell identifier.
///
/// The first column is the cell identifier. Cells with an empty or `NA`
/// value are left out of the returned map.
pub fn load_metadata_column(path: impl AsRef<Path>, column: &str) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let malformed = |message: String| CellDistillError::MalformedData { path: path.to_path_buf(), message };

    let file = File::open(path).map_err(|e| CellDistillError::io(format!("opening {}", path.display()), e))?;
    let mut reader = ReaderBuilder::new().has_headers(true).delimiter(delimiter_for(path)).from_reader(file);

    let headers = reader.headers().map_err(|e| malformed(e.to_string()))?.clone();
    let col = headers
        .iter()
        .skip(1)
        .position(|h| h.trim() == column)
        .map(|i| i + 1)
        .ok_or_else(|| CellDistillError::ConfigValue {
            field: "metadata.celltype_column".into(),
            message: format!("column '{column}' not found in {}", path.display()),
            suggestion: format!(
                "Available columns: {}",
                headers.iter().skip(1).collect::<Vec<_>>().join(", ")
            ),
        })?;

    let mut labels = HashMap::new();
    for result in reader.records() {
        let record = result.map_err(|e| malformed(e.to_string()))?;
        let cell = record.get(0).unwrap_or_default().trim();
        let value = record.get(col).unwrap_or_default().trim();
        if cell.is_empty() || value.is_empty() || value == "NA" || value == "nan" {
            continue;
        }
        labels.insert(cell.to_string(), value.to_string());
    }
    Ok(labels)
}
