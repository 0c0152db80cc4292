//! File formats: expression matrices, cell metadata, prediction tables and
//! classifier weights.

mod matrix;
mod metadata;
mod table;
mod weights;

pub use matrix::load_dense_csv;
pub use metadata::load_metadata_column;
pub use table::{write_cell_table, CELL_TABLE_HEADER};
pub use weights::{load_mlp_weights, save_mlp_weights};

use std::path::Path;

/// Tab for `.tsv`/`.txt` files, comma otherwise.
fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => b'\t',
        _ => b',',
    }
}
