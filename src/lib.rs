//! supplysim - purchase-order similarity pipeline
//!
//! Consolidates heterogeneous purchase-order exports into one canonical
//! transaction table, embeds and clusters product descriptions, and serves
//! similarity lookups (top matches, competitors, clusters, pricing, supplier
//! and buyer summaries) as named functions.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod schema;
pub mod service;
pub mod similarity;
pub mod storage;

pub use error::{Result, SupplyError};
