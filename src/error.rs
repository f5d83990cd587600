use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{ClusterError, EmbeddingError};

/// Main error type for supplysim build and load stages
#[derive(Error, Debug)]
pub enum SupplyError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// Malformed or unreadable delimited file
    #[error("CSV error: {context}: {source}")]
    Csv {
        source: csv::Error,
        context: String,
    },

    /// A source file lacks columns the canonical table cannot do without
    #[error("Source file {path} is missing required columns: {columns:?}")]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    /// Canonical table and embedding matrix disagree
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Embedding matrix artifact could not be (de)serialized
    #[error("Embedding matrix error: {context}: {source}")]
    Matrix {
        source: bincode::Error,
        context: String,
    },

    /// Embedding provider failures
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Clustering provider failures
    #[error("Clustering error: {0}")]
    Clustering(#[from] ClusterError),

    /// No function registered under the requested name
    #[error("Service not registered: {name}")]
    ServiceNotFound { name: String },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for supplysim operations
pub type Result<T> = std::result::Result<T, SupplyError>;
