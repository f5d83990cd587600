//! Embedding matrix artifact
//!
//! One row per canonical table row, same order. Persisted with bincode
//! together with the model name so a query-time provider mismatch can be
//! detected at load.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::temp_path;
use crate::error::{Result, SupplyError};

const FORMAT_VERSION: u32 = 1;

/// Row-aligned embedding vectors of the canonical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    format_version: u32,
    model: String,
    vectors: Array2<f32>,
}

impl EmbeddingMatrix {
    pub fn new(model: impl Into<String>, vectors: Array2<f32>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model: model.into(),
            vectors,
        }
    }

    /// Build from per-row vectors; every row must have `dimension` entries
    pub fn from_rows(
        model: impl Into<String>,
        rows: Vec<Vec<f32>>,
        dimension: usize,
    ) -> Result<Self> {
        let count = rows.len();
        let mut flat = Vec::with_capacity(count * dimension);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dimension {
                return Err(SupplyError::Consistency(format!(
                    "Embedding {} has dimension {}, expected {}",
                    i,
                    row.len(),
                    dimension
                )));
            }
            flat.extend(row);
        }

        let vectors = Array2::from_shape_vec((count, dimension), flat)
            .map_err(|e| SupplyError::Consistency(format!("Invalid matrix shape: {}", e)))?;
        Ok(Self::new(model, vectors))
    }

    pub fn rows(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Embedding model that produced the vectors
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.vectors.row(index)
    }

    /// Persist atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SupplyError::Io {
                source: e,
                context: format!("Failed to create matrix directory: {}", parent.display()),
            })?;
        }

        let temp_path = temp_path(path);
        let file = File::create(&temp_path).map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to create matrix file: {}", temp_path.display()),
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).map_err(|e| SupplyError::Matrix {
            source: e,
            context: format!("Failed to serialize matrix: {}", temp_path.display()),
        })?;
        writer.flush().map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to flush matrix file: {}", temp_path.display()),
        })?;
        drop(writer);

        fs::rename(&temp_path, path).map_err(|e| SupplyError::Io {
            source: e,
            context: format!(
                "Failed to move matrix into place: {} -> {}",
                temp_path.display(),
                path.display()
            ),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to open matrix file: {}", path.display()),
        })?;
        let matrix: Self =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| SupplyError::Matrix {
                source: e,
                context: format!("Failed to deserialize matrix: {}", path.display()),
            })?;

        if matrix.format_version != FORMAT_VERSION {
            return Err(SupplyError::Consistency(format!(
                "Unsupported matrix format version {} in {}",
                matrix.format_version,
                path.display()
            )));
        }

        Ok(matrix)
    }
}
