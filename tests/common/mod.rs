//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use supplysim::embedding::{EmbeddingError, EmbeddingProvider};

pub const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: every lowercase token is hashed
/// (FNV-1a) into one of `DIMENSION` buckets.
pub struct HashingEmbedder;

impl HashingEmbedder {
    fn bucket(token: &str) -> usize {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % DIMENSION as u64) as usize
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; DIMENSION];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[Self::bucket(token)] += 1.0;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "hashing-test"
    }
}

/// Purchase orders in a reduced export layout
pub const ORDERS_HEADER: &str = "PO ID,Creation Date,PR ID,Supplier Name,Supplier Duns No,\
Quantity,Unit Price,Product Description,Buyer: First Name,Buyer: Last Name";

pub const ORDERS: &[&str] = &[
    "1001,2023-03-01 09:15:00,000123,Acme Industrial,004512345,10,$12.50,steel pipe 2 inch,Ada,Lovelace",
    "1002,2023-03-02 10:00:00,000124,Pipeworks Ltd,,4,\"1,250.00\",steel pipe schedule 40,Alan,Turing",
    "1003,2023-03-03 11:30:00,000125,Glovco,,100,0.35,nitrile gloves large,Ada,Lovelace",
    "1004,2023-03-04 08:45:00,000126,Paperco,,20,4.99,copy paper a4 ream,Grace,Hopper",
    "1005,2023-03-05 14:20:00,000127,Acme Industrial,,2,N/A,steel rod 10mm,Alan,Turing",
    "1006,2023-03-06 16:05:00,000128,Glovco,,50,0.40,latex gloves medium,Grace,Hopper",
];

/// Write `rows` under `header` to `dir/name`
pub fn write_export(dir: &Path, name: &str, header: &str, rows: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    let mut content = format!("{}\n", header);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(dir.join(name), content).unwrap();
}
