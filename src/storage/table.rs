//! Canonical transaction table on disk (UTF-8 CSV with a header row)

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::temp_path;
use crate::error::{Result, SupplyError};
use crate::schema::{SchemaNormalizer, TransactionRecord, CANONICAL_COLUMNS, CLUSTER_COLUMN};

/// Streaming writer for the canonical table.
///
/// The header is emitted exactly once, ahead of the first batch written
/// through this writer (or on [`TableWriter::finish`] when nothing was
/// written).
pub struct TableWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    with_cluster: bool,
    header_written: bool,
    rows: usize,
}

impl TableWriter {
    /// Open `path` for appending, creating it (and its parent) if needed
    pub fn append(path: &Path) -> Result<Self> {
        Self::open(path, false, true)
    }

    /// Create or truncate `path`; `with_cluster` adds the `Cluster` column
    pub fn create(path: &Path, with_cluster: bool) -> Result<Self> {
        Self::open(path, with_cluster, false)
    }

    fn open(path: &Path, with_cluster: bool, append: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SupplyError::Io {
                source: e,
                context: format!("Failed to create table directory: {}", parent.display()),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| SupplyError::Io {
                source: e,
                context: format!("Failed to open table for writing: {}", path.display()),
            })?;

        // an appended table that already has content carries its header
        let header_written = append
            && file
                .metadata()
                .map_err(|e| SupplyError::Io {
                    source: e,
                    context: format!("Failed to inspect table: {}", path.display()),
                })?
                .len()
                > 0;

        Ok(Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(file),
            path: path.to_path_buf(),
            with_cluster,
            header_written,
            rows: 0,
        })
    }

    /// Append a batch of records, writing the header first if still pending
    pub fn write_batch(&mut self, records: &[TransactionRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        self.ensure_header()?;
        for record in records {
            let mut row = record.to_row();
            if self.with_cluster {
                row.push(record.cluster.map(|c| c.to_string()).unwrap_or_default());
            }
            self.writer.write_record(&row).map_err(|e| self.csv_error(e))?;
        }
        self.writer.flush().map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to flush table: {}", self.path.display()),
        })?;

        self.rows += records.len();
        Ok(records.len())
    }

    /// Flush, writing a bare header when no rows were ever written
    pub fn finish(mut self) -> Result<usize> {
        self.ensure_header()?;
        self.writer.flush().map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to flush table: {}", self.path.display()),
        })?;
        Ok(self.rows)
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }

        let mut header: Vec<&str> = CANONICAL_COLUMNS.to_vec();
        if self.with_cluster {
            header.push(CLUSTER_COLUMN);
        }
        self.writer.write_record(&header).map_err(|e| self.csv_error(e))?;
        self.header_written = true;
        Ok(())
    }

    fn csv_error(&self, source: csv::Error) -> SupplyError {
        SupplyError::Csv {
            source,
            context: format!("Failed to write table: {}", self.path.display()),
        }
    }
}

/// Write a full table atomically (temp file + rename)
pub fn write_table(path: &Path, records: &[TransactionRecord], with_cluster: bool) -> Result<()> {
    let temp_path = temp_path(path);
    let mut writer = TableWriter::create(&temp_path, with_cluster)?;
    writer.write_batch(records)?;
    writer.finish()?;

    fs::rename(&temp_path, path).map_err(|e| SupplyError::Io {
        source: e,
        context: format!(
            "Failed to move table into place: {} -> {}",
            temp_path.display(),
            path.display()
        ),
    })
}

/// Read a canonical (optionally clustered) table back into memory
pub fn read_table(path: &Path) -> Result<Vec<TransactionRecord>> {
    let csv_error = |source: csv::Error| SupplyError::Csv {
        source,
        context: format!("Failed to read table: {}", path.display()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let header: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();
    let normalizer = SchemaNormalizer::new(&BTreeMap::new())?;
    let layout = normalizer.resolve(&header, path)?;
    let cluster_index = header.iter().position(|h| h == CLUSTER_COLUMN);

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(csv_error)?;
        let cells: Vec<String> = row.iter().map(str::to_string).collect();
        let mut record = normalizer.normalize_row(&layout, &cells);

        if let Some(raw) = cluster_index.and_then(|i| cells.get(i)) {
            let raw = raw.trim();
            if !raw.is_empty() {
                let label = raw.parse::<u32>().map_err(|_| {
                    SupplyError::Consistency(format!(
                        "Invalid cluster label '{}' on data row {} of {}",
                        raw,
                        line + 1,
                        path.display()
                    ))
                })?;
                record.cluster = Some(label);
            }
        }

        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(description: &str, supplier: &str, price: Option<f64>) -> TransactionRecord {
        TransactionRecord {
            pr_id: "0042".to_string(),
            product_description: description.to_string(),
            supplier_name: supplier.to_string(),
            unit_price: price,
            ..Default::default()
        }
    }

    #[test]
    fn test_header_written_once_across_batches() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("table.csv");

        let mut writer = TableWriter::append(&path).unwrap();
        writer.write_batch(&[record("a", "s1", Some(1.0))]).unwrap();
        writer.write_batch(&[record("b", "s2", None)]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("PO ID").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_reopened_table_keeps_single_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("table.csv");

        for description in ["a", "b"] {
            let mut writer = TableWriter::append(&path).unwrap();
            writer.write_batch(&[record(description, "s1", None)]).unwrap();
            writer.finish().unwrap();
        }
        TableWriter::append(&path).unwrap().finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("PO ID").count(), 1);

        let loaded = read_table(&path).unwrap();
        let descriptions: Vec<_> = loaded.iter().map(|r| r.product_description.as_str()).collect();
        assert_eq!(descriptions, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("table.csv");

        TableWriter::append(&path).unwrap().finish().unwrap();
        assert!(read_table(&path).unwrap().is_empty());
    }

    #[test]
    fn test_clustered_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("table.csv");

        let mut first = record("steel pipe", "Acme", Some(12.5));
        first.cluster = Some(3);
        let mut second = record("", "", None);
        second.cluster = Some(0);

        write_table(&path, &[first.clone(), second.clone()], true).unwrap();
        let loaded = read_table(&path).unwrap();

        assert_eq!(loaded, vec![first, second]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_invalid_cluster_label() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("table.csv");
        fs::write(
            &path,
            "Product Description,Supplier Name,Unit Price,Cluster\npipe,Acme,1.0,x\n",
        )
        .unwrap();

        assert!(matches!(
            read_table(&path),
            Err(SupplyError::Consistency(_))
        ));
    }
}
