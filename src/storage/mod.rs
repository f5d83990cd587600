//! Flat-file artifacts shared between pipeline stages
//!
//! - `table`: the canonical transaction table (CSV)
//! - `matrix`: the row-aligned embedding matrix (bincode)

mod matrix;
mod table;

pub use matrix::EmbeddingMatrix;
pub use table::{read_table, write_table, TableWriter};

use std::path::{Path, PathBuf};

/// Sibling of `path` with `.tmp` appended to the file name
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
