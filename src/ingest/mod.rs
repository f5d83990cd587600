//! Batch ingestion of raw transaction exports
//!
//! Every `*.csv` file of the input directory is streamed in bounded chunks
//! through the [`SchemaNormalizer`] and appended to one canonical table.
//! Files are processed sequentially in file-name order; any unreadable or
//! malformed file aborts the run.

use encoding_rs::Encoding;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::{Result, SupplyError};
use crate::schema::{SchemaNormalizer, SourceLayout};
use crate::storage::TableWriter;

/// Default chunk ceiling in rows
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Summary of an ingestion run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub rows: usize,
}

/// Streams raw exports into the canonical table
pub struct BatchIngestor {
    normalizer: SchemaNormalizer,
    encoding: &'static Encoding,
    chunk_size: usize,
}

impl BatchIngestor {
    pub fn new(normalizer: SchemaNormalizer, encoding: &'static Encoding, chunk_size: usize) -> Self {
        Self {
            normalizer,
            encoding,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Build an ingestor from the `[ingest]` configuration section
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let encoding = Encoding::for_label(config.encoding.as_bytes()).ok_or_else(|| {
            SupplyError::InvalidConfigValue {
                path: "ingest.encoding".to_string(),
                message: format!("Unknown encoding label: {}", config.encoding),
            }
        })?;
        let normalizer = SchemaNormalizer::new(&config.aliases)?;
        Ok(Self::new(normalizer, encoding, config.chunk_size))
    }

    /// Source files of `input_dir`, sorted by file name
    pub fn discover(input_dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(input_dir).map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to list input directory: {}", input_dir.display()),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SupplyError::Io {
                    source: e,
                    context: format!("Failed to read entry in {}", input_dir.display()),
                })?
                .path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Ingest every source file of `input_dir`, appending to `output_path`.
    ///
    /// The output is opened in append mode: callers wanting a fresh table
    /// must remove an existing file first. The header is written once, with
    /// the first chunk of the run.
    pub fn ingest(&self, input_dir: &Path, output_path: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let files = Self::discover(input_dir)?;
        info!(
            "Processing {} transaction files from {}",
            files.len(),
            input_dir.display()
        );

        let mut writer = TableWriter::append(output_path)?;
        let mut report = IngestReport::default();

        for path in &files {
            info!("Processing: {}", path.display());
            let (chunks, rows) = self.ingest_file(path, &mut writer)?;
            report.files += 1;
            report.chunks += chunks;
            report.rows += rows;
        }

        writer.finish()?;

        info!(
            "Ingestion complete: {} files, {} chunks, {} rows, {}ms",
            report.files,
            report.chunks,
            report.rows,
            start.elapsed().as_millis()
        );

        Ok(report)
    }

    /// Stream one file through the normalizer; returns (chunks, rows)
    fn ingest_file(&self, path: &Path, writer: &mut TableWriter) -> Result<(usize, usize)> {
        let csv_error = |source: csv::Error| SupplyError::Csv {
            source,
            context: format!("Failed to read source file: {}", path.display()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_error)?;

        let header = self.decode(reader.byte_headers().map_err(csv_error)?);
        let layout = self.normalizer.resolve(&header, path)?;
        if layout.is_positional() {
            info!("{}: mapped by export column position", path.display());
        }

        let mut chunk: Vec<Vec<String>> = Vec::with_capacity(self.chunk_size.min(8192));
        let mut chunks = 0;
        let mut rows = 0;

        for record in reader.byte_records() {
            chunk.push(self.decode(&record.map_err(csv_error)?));

            if chunk.len() >= self.chunk_size {
                rows += self.flush_chunk(&layout, &mut chunk, writer)?;
                chunks += 1;
            }
        }

        if !chunk.is_empty() {
            rows += self.flush_chunk(&layout, &mut chunk, writer)?;
            chunks += 1;
        }

        debug!("{}: {} rows in {} chunks", path.display(), rows, chunks);
        Ok((chunks, rows))
    }

    fn flush_chunk(
        &self,
        layout: &SourceLayout,
        chunk: &mut Vec<Vec<String>>,
        writer: &mut TableWriter,
    ) -> Result<usize> {
        let records = self.normalizer.normalize(layout, chunk);
        chunk.clear();
        writer.write_batch(&records)
    }

    fn decode(&self, record: &csv::ByteRecord) -> Vec<String> {
        record
            .iter()
            .map(|field| {
                let (text, _) = self.encoding.decode_without_bom_handling(field);
                text.into_owned()
            })
            .collect()
    }
}
