use crate::config::Config;
use crate::error::{Result, SupplyError, ValidationError};
use crate::schema::CANONICAL_COLUMNS;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_paths(config, &mut errors);
        Self::validate_ingest(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_clustering(config, &mut errors);
        Self::validate_scoring(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SupplyError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_paths(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.paths.transactions_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "paths.transactions_dir",
                "Transactions directory cannot be empty",
            ));
        }

        if config.paths.table.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "paths.table",
                "Table path cannot be empty",
            ));
        }

        if config.paths.embeddings.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "paths.embeddings",
                "Embeddings path cannot be empty",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.ingest.chunk_size == 0 {
            errors.push(ValidationError::new(
                "ingest.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        let label = &config.ingest.encoding;
        if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
            errors.push(ValidationError::new(
                "ingest.encoding",
                format!("Unknown encoding label: {}", label),
            ));
        }

        for (alias, target) in &config.ingest.aliases {
            if !CANONICAL_COLUMNS.contains(&target.as_str()) {
                errors.push(ValidationError::new(
                    format!("ingest.aliases.{}", alias),
                    format!("'{}' is not a canonical column", target),
                ));
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_clustering(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.clustering.k == 0 {
            errors.push(ValidationError::new(
                "clustering.k",
                "Cluster count must be greater than 0",
            ));
        }

        if config.clustering.n_init == 0 {
            errors.push(ValidationError::new(
                "clustering.n_init",
                "n_init must be greater than 0",
            ));
        }

        if config.clustering.max_iter == 0 {
            errors.push(ValidationError::new(
                "clustering.max_iter",
                "max_iter must be greater than 0",
            ));
        }
    }

    fn validate_scoring(config: &Config, errors: &mut Vec<ValidationError>) {
        let scoring = &config.scoring;
        for (path, weight) in [
            ("scoring.vector_weight", scoring.vector_weight),
            ("scoring.lexical_weight", scoring.lexical_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", weight),
                ));
            }
        }

        if scoring.vector_weight + scoring.lexical_weight == 0.0 {
            errors.push(ValidationError::new(
                "scoring",
                "At least one scoring weight must be positive",
            ));
        }

        if scoring.aggregate_top_n == 0 {
            errors.push(ValidationError::new(
                "scoring.aggregate_top_n",
                "Aggregate window must be greater than 0",
            ));
        }
    }
}
