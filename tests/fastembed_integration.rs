/// Similarity lookups backed by the real embedding model
///
/// Ignored by default: the first run downloads all-MiniLM-L6-v2 (~90MB).
/// Run with: cargo test -- --ignored
mod common;

use std::sync::Arc;
use tempfile::TempDir;

use supplysim::config::Config;
use supplysim::embedding::{EmbeddingIndexer, FastEmbedProvider, IndexSettings, KMeans};
use supplysim::ingest::BatchIngestor;
use supplysim::similarity::{EngineSettings, SimilarityEngine};

use common::{write_export, ORDERS, ORDERS_HEADER};

#[test]
#[ignore] // Requires model download
fn test_semantic_ranking_with_fastembed() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("transactions");
    write_export(&input, "orders.csv", ORDERS_HEADER, ORDERS);

    let table = temp.path().join("TRANSACTIONS.csv");
    let matrix = temp.path().join("embeddings.bin");
    BatchIngestor::from_config(&Config::default().ingest)
        .unwrap()
        .ingest(&input, &table)
        .unwrap();

    let provider = Arc::new(
        FastEmbedProvider::with_default_model().expect("Failed to initialize embedding provider"),
    );
    println!("✓ Embedding provider initialized");

    let indexer = EmbeddingIndexer::new(
        provider.clone(),
        Arc::new(KMeans::default()),
        IndexSettings {
            k: 2,
            ..Default::default()
        },
    );
    let report = indexer.run(&table, &matrix).unwrap();
    assert_eq!(report.rows, ORDERS.len());
    assert_eq!(report.dimension, 384);

    let engine =
        SimilarityEngine::load(&table, &matrix, provider, EngineSettings::default()).unwrap();

    let view = engine.rank("disposable hand protection", 3, None).unwrap();
    let top = view.first_hit().unwrap();
    println!(
        "✓ Top match: {} ({:.3})",
        top.record.product_description, top.similarity_score
    );
    assert!(top.record.product_description.contains("gloves"));
}
