/// Embedding and clustering stage over the canonical table
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{ClusteringProvider, EmbeddingProvider};
use crate::error::{Result, SupplyError};
use crate::schema::TransactionRecord;
use crate::storage::{read_table, write_table, EmbeddingMatrix};

/// Parameters of one indexing run
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Descriptions sent to the provider per call
    pub batch_size: usize,
    /// Number of clusters
    pub k: usize,
    /// Clustering seed
    pub seed: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            batch_size: 32,
            k: 10,
            seed: 42,
        }
    }
}

/// Outcome of an indexing run
#[derive(Debug)]
pub struct IndexReport {
    pub rows: usize,
    pub dimension: usize,
    pub clusters: usize,
    pub duration_ms: u64,
}

/// Computes one embedding per transaction and a cluster label per row
pub struct EmbeddingIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    clusterer: Arc<dyn ClusteringProvider>,
    settings: IndexSettings,
}

impl EmbeddingIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        clusterer: Arc<dyn ClusteringProvider>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            embedder,
            clusterer,
            settings,
        }
    }

    /// Embed every `Product Description`, in row order.
    ///
    /// Empty descriptions are embedded as empty text; no row is skipped.
    pub fn embed_records(&self, records: &[TransactionRecord]) -> Result<EmbeddingMatrix> {
        let dimension = self.embedder.dimension();
        let texts: Vec<String> = records
            .iter()
            .map(|r| r.product_description.clone())
            .collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.settings.batch_size.max(1)) {
            let embeddings = self.embedder.embed_batch(chunk)?;

            if embeddings.len() != chunk.len() {
                return Err(SupplyError::Consistency(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }

            vectors.extend(embeddings);
            debug!("Embedded {}/{} descriptions", vectors.len(), texts.len());
        }

        let matrix = EmbeddingMatrix::from_rows(self.embedder.model_name(), vectors, dimension)?;
        if matrix.rows() != records.len() {
            return Err(SupplyError::Consistency(format!(
                "Matrix has {} rows for {} transactions",
                matrix.rows(),
                records.len()
            )));
        }

        Ok(matrix)
    }

    /// Embed and cluster `records` in place, returning the matrix
    pub fn index_records(&self, records: &mut [TransactionRecord]) -> Result<EmbeddingMatrix> {
        let matrix = self.embed_records(records)?;

        info!(
            "Fitting {} clusters over {} embeddings",
            self.settings.k,
            matrix.rows()
        );
        let labels = self
            .clusterer
            .fit_predict(matrix.view(), self.settings.k, self.settings.seed)?;

        if labels.len() != records.len() {
            return Err(SupplyError::Consistency(format!(
                "Clustering returned {} labels for {} transactions",
                labels.len(),
                records.len()
            )));
        }

        for (record, label) in records.iter_mut().zip(labels) {
            record.cluster = Some(label);
        }

        Ok(matrix)
    }

    /// Read the canonical table, index it, and write the clustered table
    /// back to `table_path` together with the matrix at `matrix_path`.
    pub fn run(&self, table_path: &Path, matrix_path: &Path) -> Result<IndexReport> {
        let start = Instant::now();

        info!("Loading transactions from {}", table_path.display());
        let mut records = read_table(table_path)?;

        info!(
            "Computing embeddings for {} transactions with {}",
            records.len(),
            self.embedder.model_name()
        );
        let matrix = self.index_records(&mut records)?;

        write_table(table_path, &records, true)?;
        matrix.save(matrix_path)?;

        let report = IndexReport {
            rows: records.len(),
            dimension: matrix.dimension(),
            clusters: self.settings.k,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Indexing complete: {} rows, {}D, {} clusters, {}ms",
            report.rows, report.dimension, report.clusters, report.duration_ms
        );

        Ok(report)
    }
}
