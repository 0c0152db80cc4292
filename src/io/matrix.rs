//! Dense expression matrix loading

use std::fs::File;
use std::path::Path;

use ::csv::ReaderBuilder;
use celldistill_common::{CellDistillError, Result};
use ndarray::Array2;
use tracing::info;

use super::delimiter_for;
use crate::preprocess::{make_unique, ExpressionMatrix};

/// Load a features × cells table and return it as cells × features.
///
/// The header row holds cell identifiers after one leading (ignored) cell;
/// every following row is a feature name and one value per cell. Repeated
/// cell identifiers are made unique with `-n` suffixes.
pub fn load_dense_csv(path: impl AsRef<Path>) -> Result<ExpressionMatrix> {
    let path = path.as_ref();
    let malformed = |message: String| CellDistillError::MalformedData { path: path.to_path_buf(), message };

    let file = File::open(path).map_err(|e| CellDistillError::io(format!("opening {}", path.display()), e))?;
    let mut reader = ReaderBuilder::new().has_headers(true).delimiter(delimiter_for(path)).from_reader(file);

    let headers = reader.headers().map_err(|e| malformed(e.to_string()))?.clone();
    let cells: Vec<String> = headers.iter().skip(1).map(|s| s.trim().to_string()).collect();
    if cells.is_empty() {
        return Err(malformed("header row has no cell identifiers".into()));
    }

    let mut features = Vec::new();
    let mut values = Vec::new();
    for (lineno, result) in reader.records().enumerate() {
        let record = result.map_err(|e| malformed(e.to_string()))?;
        let mut fields = record.iter();
        let feature = fields.next().unwrap_or_default().trim().to_string();
        let before = values.len();
        for field in fields {
            let v: f32 = field.trim().parse().map_err(|_| {
                malformed(format!("line {}: '{}' is not a number (feature '{feature}')", lineno + 2, field))
            })?;
            values.push(v);
        }
        if values.len() - before != cells.len() {
            return Err(malformed(format!(
                "line {}: expected {} values, found {}",
                lineno + 2,
                cells.len(),
                values.len() - before
            )));
        }
        features.push(feature);
    }

    let by_feature = Array2::from_shape_vec((features.len(), cells.len()), values)
        .map_err(|e| malformed(e.to_string()))?;
    let values = by_feature.reversed_axes().as_standard_layout().to_owned();

    info!(path = %path.display(), cells = cells.len(), features = features.len(), "loaded expression matrix");
    ExpressionMatrix::new(make_unique(&cells), features, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_transposes_to_cells_by_features() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, ",cellA,cellB,cellA").unwrap();
        writeln!(file, "CD3E,1,0,2").unwrap();
        writeln!(file, "LYZ,0,5,0.5").unwrap();
        file.flush().unwrap();

        let m = load_dense_csv(file.path()).unwrap();
        assert_eq!(m.cells, vec!["cellA", "cellB", "cellA-1"]);
        assert_eq!(m.features, vec!["CD3E", "LYZ"]);
        assert_eq!(m.values, array![[1.0, 0.0], [0.0, 5.0], [2.0, 0.5]]);
    }

    #[test]
    fn test_tab_separated() {
        let mut file = NamedTempFile::with_suffix(".tsv").unwrap();
        writeln!(file, "gene\tc1\tc2").unwrap();
        writeln!(file, "NKG7\t3\t4").unwrap();
        file.flush().unwrap();

        let m = load_dense_csv(file.path()).unwrap();
        assert_eq!(m.values, array![[3.0], [4.0]]);
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, ",c1,c2").unwrap();
        writeln!(file, "CD3E,1,x").unwrap();
        file.flush().unwrap();

        let err = load_dense_csv(file.path()).unwrap_err();
        assert!(matches!(err, CellDistillError::MalformedData { .. }));
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(load_dense_csv("/nonexistent/data.csv"), Err(CellDistillError::Io { .. })));
    }
}
