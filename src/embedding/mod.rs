/// Embedding & clustering
///
/// - EmbeddingProvider trait with a FastEmbed implementation
///   (all-MiniLM-L6-v2, 384-dim)
/// - ClusteringProvider trait with a seeded k-means implementation
/// - EmbeddingIndexer producing the embedding matrix and `Cluster` labels
mod cluster;
mod indexer;
mod provider;

pub use cluster::{ClusterError, ClusteringProvider, KMeans};
pub use indexer::{EmbeddingIndexer, IndexReport, IndexSettings};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
