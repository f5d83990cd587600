//! Query-time similarity engine
//!
//! [`SimilarityEngine`] owns the clustered transaction table, its embedding
//! matrix and the provider handles. It is built once at startup and is
//! read-only afterwards; share it behind an `Arc`.
//!
//! Every row is scored as
//! `vector_weight * cosine_sim + lexical_weight * edit_ratio`, where
//! `edit_ratio` is the lexical ratio normalized to [0, 1].

mod lexical;
mod ranking;
mod stats;

pub use lexical::{LevenshteinRatio, LexicalSimilarity};
pub use ranking::{DisplayRow, DisplayView, FullView, PaddingRow, ScoreWeights, ScoredMatch};
pub use stats::{summarize_by, GroupSummary, PriceStats};

use ndarray::ArrayView1;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ScoringConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SupplyError};
use crate::schema::TransactionRecord;
use crate::storage::{read_table, EmbeddingMatrix};
use ranking::sort_by_score;

/// Cluster id reported when no cluster can be determined
pub const UNKNOWN_CLUSTER: i64 = -1;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query embedding failed: {0}")]
    EmbeddingError(String),

    #[error("Query embedding has dimension {actual}, index has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index is empty")]
    EmptyIndex,

    #[error("Row {row} has no cluster label")]
    MissingCluster { row: usize },
}

/// Query-time knobs
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub weights: ScoreWeights,
    /// Rows aggregated by pricing and summary operations
    pub aggregate_top_n: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            aggregate_top_n: 20,
        }
    }
}

impl From<&ScoringConfig> for EngineSettings {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            weights: ScoreWeights {
                vector: config.vector_weight,
                lexical: config.lexical_weight,
            },
            aggregate_top_n: config.aggregate_top_n,
        }
    }
}

/// Scores of one row for one query
#[derive(Debug, Clone, Copy)]
struct RowScore {
    index: usize,
    similarity_score: f32,
    cosine_sim: f32,
    edit_ratio: f32,
}

pub struct SimilarityEngine {
    records: Vec<TransactionRecord>,
    matrix: EmbeddingMatrix,
    norms: Vec<f32>,
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: Arc<dyn LexicalSimilarity>,
    settings: EngineSettings,
}

impl SimilarityEngine {
    /// Assemble an engine from in-memory parts.
    ///
    /// Fails when the table and matrix disagree in length, or when the
    /// matrix was built by a different model or dimension than `embedder`.
    pub fn new(
        records: Vec<TransactionRecord>,
        matrix: EmbeddingMatrix,
        embedder: Arc<dyn EmbeddingProvider>,
        lexical: Arc<dyn LexicalSimilarity>,
        settings: EngineSettings,
    ) -> Result<Self> {
        if records.len() != matrix.rows() {
            return Err(SupplyError::Consistency(format!(
                "Table has {} rows but embedding matrix has {}",
                records.len(),
                matrix.rows()
            )));
        }

        if !matrix.is_empty() {
            if matrix.model() != embedder.model_name() {
                return Err(SupplyError::Consistency(format!(
                    "Embedding matrix was built with '{}' but queries use '{}'",
                    matrix.model(),
                    embedder.model_name()
                )));
            }
            if matrix.dimension() != embedder.dimension() {
                return Err(SupplyError::Consistency(format!(
                    "Embedding matrix has dimension {} but the provider produces {}",
                    matrix.dimension(),
                    embedder.dimension()
                )));
            }
        }

        let norms = matrix
            .view()
            .rows()
            .into_iter()
            .map(|row| row.dot(&row).sqrt())
            .collect();

        Ok(Self {
            records,
            matrix,
            norms,
            embedder,
            lexical,
            settings,
        })
    }

    /// Load the clustered table and matrix written by the indexer
    pub fn load(
        table_path: &Path,
        matrix_path: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let records = read_table(table_path)?;
        let matrix = EmbeddingMatrix::load(matrix_path)?;
        tracing::info!(
            "Loaded {} transactions and {}x{} embeddings",
            records.len(),
            matrix.rows(),
            matrix.dimension()
        );

        Self::new(records, matrix, embedder, Arc::new(LevenshteinRatio), settings)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Top `top_n` rows, padded to exactly `top_n`. Rows whose supplier
    /// equals `exclude_supplier` are removed before ranking.
    pub fn rank(
        &self,
        query: &str,
        top_n: usize,
        exclude_supplier: Option<&str>,
    ) -> std::result::Result<DisplayView, QueryError> {
        let matches = self.ranked_matches(query, top_n, exclude_supplier)?;
        Ok(DisplayView::padded(matches, top_n))
    }

    /// Unpadded variant of [`SimilarityEngine::rank`] for aggregation
    pub fn rank_full(
        &self,
        query: &str,
        limit: usize,
        exclude_supplier: Option<&str>,
    ) -> std::result::Result<FullView, QueryError> {
        let matches = self.ranked_matches(query, limit, exclude_supplier)?;
        Ok(FullView::new(matches, limit))
    }

    /// Alternatives to the best match offered by other suppliers.
    ///
    /// Re-ranks with the best match's own description as the query and its
    /// supplier excluded. Empty when there is no genuine best match.
    pub fn find_competitors(
        &self,
        query: &str,
        top_n: usize,
    ) -> std::result::Result<DisplayView, QueryError> {
        let best = self.rank(query, 1, None)?;
        let Some(hit) = best.first_hit() else {
            return Ok(DisplayView::empty());
        };
        if hit.record.supplier_name.is_empty() {
            return Ok(DisplayView::empty());
        }

        tracing::debug!(
            "Competitors of '{}' from '{}'",
            hit.record.product_description,
            hit.record.supplier_name
        );
        self.rank(
            &hit.record.product_description,
            top_n,
            Some(&hit.record.supplier_name),
        )
    }

    /// Cluster of the row most similar to `query` by cosine alone
    pub fn try_cluster_of(&self, query: &str) -> std::result::Result<u32, QueryError> {
        if self.is_empty() {
            return Err(QueryError::EmptyIndex);
        }

        let cosine = self.cosine_scores(query)?;
        let best = cosine
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &score)| {
                if score > best.1 {
                    (i, score)
                } else {
                    best
                }
            })
            .0;

        self.records[best]
            .cluster
            .ok_or(QueryError::MissingCluster { row: best })
    }

    /// [`SimilarityEngine::try_cluster_of`] with failures mapped to
    /// [`UNKNOWN_CLUSTER`]
    pub fn cluster_of(&self, query: &str) -> i64 {
        match self.try_cluster_of(query) {
            Ok(cluster) => cluster as i64,
            Err(e) => {
                tracing::warn!("Cluster lookup failed: {}", e);
                UNKNOWN_CLUSTER
            }
        }
    }

    /// Price distribution over the aggregate window; `None` without prices
    pub fn pricing_stats(
        &self,
        query: &str,
    ) -> std::result::Result<Option<PriceStats>, QueryError> {
        let view = self.rank_full(query, self.settings.aggregate_top_n, None)?;
        Ok(PriceStats::from_values(
            view.matches().iter().filter_map(|m| m.record.unit_price),
        ))
    }

    /// Order count and mean unit price per supplier over the aggregate window
    pub fn supplier_summary(
        &self,
        query: &str,
    ) -> std::result::Result<Vec<GroupSummary>, QueryError> {
        let view = self.rank_full(query, self.settings.aggregate_top_n, None)?;
        Ok(summarize_by(view.matches(), |m| {
            Some(m.record.supplier_name.clone())
        }))
    }

    /// Order count and mean unit price per buyer over the aggregate window.
    ///
    /// Buyers are identified by the requisition requestor when any row of
    /// the window carries one, otherwise by "first last" buyer name.
    pub fn buyer_summary(
        &self,
        query: &str,
    ) -> std::result::Result<Vec<GroupSummary>, QueryError> {
        let view = self.rank_full(query, self.settings.aggregate_top_n, None)?;
        let matches = view.matches();

        let has_requestor = matches
            .iter()
            .any(|m| !m.record.requisition_requestor.is_empty());

        Ok(if has_requestor {
            summarize_by(matches, |m| Some(m.record.requisition_requestor.clone()))
        } else {
            summarize_by(matches, |m| m.record.buyer_full_name())
        })
    }

    fn ranked_matches(
        &self,
        query: &str,
        limit: usize,
        exclude_supplier: Option<&str>,
    ) -> std::result::Result<Vec<ScoredMatch>, QueryError> {
        if self.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let cosine = self.cosine_scores(query)?;
        let exclude = exclude_supplier.filter(|s| !s.is_empty());
        let weights = self.settings.weights;

        let mut scores: Vec<RowScore> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| exclude != Some(record.supplier_name.as_str()))
            .map(|(index, record)| {
                let edit_ratio =
                    (self.lexical.ratio(query, &record.product_description) / 100.0) as f32;
                let cosine_sim = cosine[index];
                RowScore {
                    index,
                    similarity_score: weights.blend(cosine_sim, edit_ratio),
                    cosine_sim,
                    edit_ratio,
                }
            })
            .collect();

        sort_by_score(&mut scores, |s| s.similarity_score);
        scores.truncate(limit);

        Ok(scores
            .into_iter()
            .map(|s| ScoredMatch {
                record: self.records[s.index].clone(),
                similarity_score: s.similarity_score,
                cosine_sim: s.cosine_sim,
                edit_ratio: s.edit_ratio,
            })
            .collect())
    }

    /// Cosine similarity of `query` against every row; zero-norm rows score 0
    fn cosine_scores(&self, query: &str) -> std::result::Result<Vec<f32>, QueryError> {
        let embedding = self
            .embedder
            .embed(query)
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        if embedding.len() != self.matrix.dimension() {
            return Err(QueryError::DimensionMismatch {
                expected: self.matrix.dimension(),
                actual: embedding.len(),
            });
        }

        let query_vector = ArrayView1::from(embedding.as_slice());
        let query_norm = query_vector.dot(&query_vector).sqrt();
        let dots = self.matrix.view().dot(&query_vector);

        Ok(dots
            .iter()
            .zip(&self.norms)
            .map(|(dot, norm)| {
                let denominator = norm * query_norm;
                if denominator > 0.0 {
                    dot / denominator
                } else {
                    0.0
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;

    /// Bag-of-words over a fixed vocabulary
    struct VocabEmbedder {
        vocabulary: Vec<&'static str>,
    }

    impl EmbeddingProvider for VocabEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            if text == "!fail" {
                return Err(EmbeddingError::GenerationError("forced".to_string()));
            }
            let lower = text.to_lowercase();
            Ok(self
                .vocabulary
                .iter()
                .map(|word| lower.split_whitespace().filter(|w| w == word).count() as f32)
                .collect())
        }

        fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.vocabulary.len()
        }

        fn model_name(&self) -> &str {
            "vocab"
        }
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(VocabEmbedder {
            vocabulary: vec!["steel", "pipe", "gloves", "nitrile", "paper"],
        })
    }

    fn record(
        description: &str,
        supplier: &str,
        price: Option<f64>,
        cluster: u32,
    ) -> TransactionRecord {
        TransactionRecord {
            product_description: description.to_string(),
            supplier_name: supplier.to_string(),
            unit_price: price,
            cluster: Some(cluster),
            ..Default::default()
        }
    }

    fn engine_with(records: Vec<TransactionRecord>) -> SimilarityEngine {
        let embedder = embedder();
        let rows = records
            .iter()
            .map(|r| embedder.embed(&r.product_description).unwrap())
            .collect();
        let matrix = EmbeddingMatrix::from_rows("vocab", rows, embedder.dimension()).unwrap();
        SimilarityEngine::new(
            records,
            matrix,
            embedder,
            Arc::new(LevenshteinRatio),
            EngineSettings::default(),
        )
        .unwrap()
    }

    fn engine() -> SimilarityEngine {
        engine_with(vec![
            record("steel pipe", "Acme", Some(10.0), 0),
            record("nitrile gloves", "Glovco", Some(3.0), 1),
            record("steel pipe 2in", "Pipeworks", Some(12.0), 0),
        ])
    }

    #[test]
    fn test_rank_pads_to_top_n() {
        let view = engine().rank("steel pipe", 5, None).unwrap();

        assert_eq!(view.len(), 5);
        assert_eq!(view.hits().count(), 3);
        for row in &view.rows()[3..] {
            assert!(row.is_padding());
            assert_eq!(row.similarity_score(), 0.0);
            assert_eq!(row.product_description(), "");
            assert_eq!(row.supplier_name(), "");
        }
    }

    #[test]
    fn test_rank_is_sorted_descending() {
        let view = engine().rank("steel pipe", 3, None).unwrap();
        let scores: Vec<f32> = view.rows().iter().map(|r| r.similarity_score()).collect();

        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(view.rows()[0].product_description(), "steel pipe");
        assert_eq!(view.rows()[2].product_description(), "nitrile gloves");
    }

    #[test]
    fn test_scores_blend_cosine_and_edit_ratio() {
        let view = engine().rank("steel pipe", 1, None).unwrap();
        let hit = view.first_hit().unwrap();

        assert!((hit.cosine_sim - 1.0).abs() < 1e-6);
        assert!((hit.edit_ratio - 1.0).abs() < 1e-6);
        assert!((hit.similarity_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_row_order() {
        let engine = engine_with(vec![
            record("paper", "First", None, 0),
            record("paper", "Second", None, 0),
            record("paper", "Third", None, 0),
        ]);

        let view = engine.rank("paper", 3, None).unwrap();
        let suppliers: Vec<&str> = view.rows().iter().map(|r| r.supplier_name()).collect();
        assert_eq!(suppliers, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_exclude_supplier_removes_best_match() {
        let view = engine().rank("steel pipe", 3, Some("Acme")).unwrap();

        assert!(view.hits().all(|h| h.record.supplier_name != "Acme"));
        assert_eq!(view.rows()[0].supplier_name(), "Pipeworks");
        assert!(view.rows()[2].is_padding());
    }

    #[test]
    fn test_find_competitors_excludes_top_supplier() {
        let view = engine().find_competitors("steel pipe", 5).unwrap();

        assert_eq!(view.len(), 5);
        assert!(view.rows().iter().all(|r| r.supplier_name() != "Acme"));
        assert_eq!(view.rows()[0].supplier_name(), "Pipeworks");
    }

    #[test]
    fn test_find_competitors_without_supplier_is_empty() {
        let engine = engine_with(vec![record("steel pipe", "", Some(1.0), 0)]);
        assert!(engine.find_competitors("steel pipe", 5).unwrap().is_empty());
    }

    #[test]
    fn test_cluster_of() {
        let engine = engine();
        assert_eq!(engine.cluster_of("nitrile gloves"), 1);
        assert_eq!(engine.cluster_of("steel"), 0);
        assert_eq!(engine.cluster_of("!fail"), UNKNOWN_CLUSTER);
    }

    #[test]
    fn test_cluster_of_unlabelled_row() {
        let mut unlabelled = record("paper", "Acme", None, 0);
        unlabelled.cluster = None;
        let engine = engine_with(vec![unlabelled]);

        assert!(matches!(
            engine.try_cluster_of("paper"),
            Err(QueryError::MissingCluster { row: 0 })
        ));
        assert_eq!(engine.cluster_of("paper"), UNKNOWN_CLUSTER);
    }

    #[test]
    fn test_pricing_stats() {
        let stats = engine().pricing_stats("steel pipe").unwrap().unwrap();

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 3.0);
        assert_eq!(stats.median, 10.0);
        assert_eq!(stats.max, 12.0);
        assert!(stats.min <= stats.p25 && stats.p25 <= stats.median);
        assert!(stats.median <= stats.p75 && stats.p75 <= stats.max);
    }

    #[test]
    fn test_pricing_stats_without_prices() {
        let engine = engine_with(vec![record("steel pipe", "Acme", None, 0)]);
        assert!(engine.pricing_stats("steel pipe").unwrap().is_none());
    }

    #[test]
    fn test_supplier_summary() {
        let engine = engine_with(vec![
            record("steel pipe", "Acme", Some(10.0), 0),
            record("steel pipe", "Acme", Some(14.0), 0),
            record("steel pipe", "Pipeworks", None, 0),
        ]);

        let summary = engine.supplier_summary("steel pipe").unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].group, "Acme");
        assert_eq!(summary[0].order_count, 2);
        assert_eq!(summary[0].mean_unit_price, Some(12.0));
        assert_eq!(summary[1].mean_unit_price, None);
    }

    #[test]
    fn test_buyer_summary_prefers_requestor() {
        let mut with_requestor = record("steel pipe", "Acme", Some(10.0), 0);
        with_requestor.requisition_requestor = "J. Doe".to_string();
        with_requestor.buyer_first_name = "Ada".to_string();
        let mut named_only = record("steel pipe", "Acme", Some(20.0), 0);
        named_only.buyer_first_name = "Ada".to_string();
        named_only.buyer_last_name = "Lovelace".to_string();

        let engine = engine_with(vec![with_requestor, named_only.clone()]);
        let summary = engine.buyer_summary("steel pipe").unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].group, "J. Doe");

        let engine = engine_with(vec![named_only]);
        let summary = engine.buyer_summary("steel pipe").unwrap();
        assert_eq!(summary[0].group, "Ada Lovelace");
        assert_eq!(summary[0].mean_unit_price, Some(20.0));
    }

    #[test]
    fn test_buyer_summary_without_identity_is_empty() {
        let engine = engine();
        assert!(engine.buyer_summary("steel pipe").unwrap().is_empty());
    }

    #[test]
    fn test_empty_index() {
        let engine = engine_with(Vec::new());

        let view = engine.rank("steel pipe", 3, None).unwrap();
        assert_eq!(view.len(), 3);
        assert!(view.rows().iter().all(DisplayRow::is_padding));

        assert!(engine.find_competitors("steel pipe", 3).unwrap().is_empty());
        assert_eq!(engine.cluster_of("steel pipe"), UNKNOWN_CLUSTER);
        assert!(engine.pricing_stats("steel pipe").unwrap().is_none());
        assert!(engine.supplier_summary("steel pipe").unwrap().is_empty());
        assert!(engine.buyer_summary("steel pipe").unwrap().is_empty());
    }

    #[test]
    fn test_embedding_failure_is_reported() {
        assert!(matches!(
            engine().rank("!fail", 5, None),
            Err(QueryError::EmbeddingError(_))
        ));
    }

    #[test]
    fn test_row_count_mismatch_is_fatal() {
        let embedder = embedder();
        let matrix = EmbeddingMatrix::from_rows("vocab", vec![vec![0.0; 5]], 5).unwrap();
        let result = SimilarityEngine::new(
            Vec::new(),
            matrix,
            embedder,
            Arc::new(LevenshteinRatio),
            EngineSettings::default(),
        );
        assert!(matches!(result, Err(SupplyError::Consistency(_))));
    }

    #[test]
    fn test_model_mismatch_is_fatal() {
        let matrix = EmbeddingMatrix::from_rows("other-model", vec![vec![1.0; 5]], 5).unwrap();
        let result = SimilarityEngine::new(
            vec![record("pipe", "Acme", None, 0)],
            matrix,
            embedder(),
            Arc::new(LevenshteinRatio),
            EngineSettings::default(),
        );
        assert!(matches!(result, Err(SupplyError::Consistency(_))));
    }
}
