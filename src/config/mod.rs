//! Configuration management for supplysim
//!
//! Loads the TOML configuration, applies `SUPPLYSIM_*` environment overrides
//! and validates the result before any pipeline stage runs.

use crate::error::{Result, SupplyError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub paths: PathsConfig,
    pub ingest: IngestConfig,
    pub embedding: EmbeddingConfig,
    pub clustering: ClusteringConfig,
    pub scoring: ScoringConfig,
    pub service: ServiceConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Locations of the raw exports and the build artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the raw transaction CSV exports
    pub transactions_dir: PathBuf,
    /// Canonical transaction table (CSV)
    pub table: PathBuf,
    /// Embedding matrix artifact
    pub embeddings: PathBuf,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum number of rows held in memory per chunk
    pub chunk_size: usize,
    /// Encoding label of the raw exports (WHATWG label, e.g. "latin1", "utf-8")
    pub encoding: String,
    /// Extra source header names mapped onto canonical column names
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Clustering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub k: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
}

/// Query-time scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of the cosine similarity term
    pub vector_weight: f32,
    /// Weight of the edit-ratio term
    pub lexical_weight: f32,
    /// Rows returned by display endpoints
    pub top_n: usize,
    /// Rows aggregated by pricing and summary endpoints
    pub aggregate_top_n: usize,
}

/// Service deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SupplyError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file at `path`, or the defaults when it does not exist
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::warn!(
                "Config file not found, using defaults. Run 'supplysim config init' to create one."
            );
            let mut config = Config::default();
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            return Ok(config);
        }

        Self::load(&path)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SUPPLYSIM_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("SUPPLYSIM_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "PATHS__TRANSACTIONS_DIR" => self.paths.transactions_dir = PathBuf::from(value),
            "PATHS__TABLE" => self.paths.table = PathBuf::from(value),
            "PATHS__EMBEDDINGS" => self.paths.embeddings = PathBuf::from(value),
            "INGEST__CHUNK_SIZE" => self.ingest.chunk_size = parse_env(path, value)?,
            "INGEST__ENCODING" => self.ingest.encoding = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_env(path, value)?,
            "CLUSTERING__K" => self.clustering.k = parse_env(path, value)?,
            "CLUSTERING__SEED" => self.clustering.seed = parse_env(path, value)?,
            "CLUSTERING__N_INIT" => self.clustering.n_init = parse_env(path, value)?,
            "CLUSTERING__MAX_ITER" => self.clustering.max_iter = parse_env(path, value)?,
            "SCORING__VECTOR_WEIGHT" => self.scoring.vector_weight = parse_env(path, value)?,
            "SCORING__LEXICAL_WEIGHT" => self.scoring.lexical_weight = parse_env(path, value)?,
            "SCORING__TOP_N" => self.scoring.top_n = parse_env(path, value)?,
            "SCORING__AGGREGATE_TOP_N" => {
                self.scoring.aggregate_top_n = parse_env(path, value)?
            }
            "SERVICE__HOST" => self.service.host = value.to_string(),
            "SERVICE__USERNAME" => self.service.username = Some(value.to_string()),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SupplyError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("supplysim").join("config.toml"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| SupplyError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            paths: PathsConfig {
                transactions_dir: data_dir.join("transactions"),
                table: data_dir.join("TRANSACTIONS.csv"),
                embeddings: PathBuf::from("outputs").join("product_desc_embeddings.bin"),
            },
            ingest: IngestConfig {
                chunk_size: crate::ingest::DEFAULT_CHUNK_SIZE,
                encoding: "latin1".to_string(),
                aliases: BTreeMap::new(),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            clustering: ClusteringConfig {
                k: 10,
                seed: 42,
                n_init: 10,
                max_iter: 300,
            },
            scoring: ScoringConfig {
                vector_weight: 0.9,
                lexical_weight: 0.1,
                top_n: 5,
                aggregate_top_n: 20,
            },
            service: ServiceConfig {
                host: "http://localhost:9004/".to_string(),
                username: None,
            },
        }
    }
}
