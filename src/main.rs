use std::path::{Path, PathBuf};
use std::sync::Arc;

use supplysim::cli::{Cli, Commands, ConfigAction};
use supplysim::config::Config;
use supplysim::embedding::{
    EmbeddingIndexer, EmbeddingProvider, FastEmbedProvider, IndexSettings, KMeans,
};
use supplysim::error::{Result, SupplyError};
use supplysim::ingest::BatchIngestor;
use supplysim::service::{register_similarity_services, Endpoint, ServiceRegistry};
use supplysim::similarity::{EngineSettings, SimilarityEngine};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Build => {
            cmd_build(cli.config)?;
        }
        Commands::Ingest { input, output } => {
            cmd_ingest(cli.config, input, output)?;
        }
        Commands::Index => {
            cmd_index(cli.config)?;
        }
        Commands::Deploy {
            host,
            username,
            password,
        } => {
            cmd_deploy(cli.config, host, username, password)?;
        }
        Commands::Query { service, text } => {
            cmd_query(cli.config, &service, &text)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "supplysim=debug"
    } else {
        "supplysim=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_build(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let table = expand_path(&config.paths.table)?;

    if table.exists() {
        tracing::info!("Removing existing table {}", table.display());
        std::fs::remove_file(&table).map_err(|e| SupplyError::Io {
            source: e,
            context: format!("Failed to remove existing table: {:?}", table),
        })?;
    }

    run_ingest(&config, &expand_path(&config.paths.transactions_dir)?, &table)?;
    run_index(&config)?;

    println!("✓ Build complete");
    Ok(())
}

fn cmd_ingest(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let input = expand_path(&input.unwrap_or_else(|| config.paths.transactions_dir.clone()))?;
    let output = expand_path(&output.unwrap_or_else(|| config.paths.table.clone()))?;

    run_ingest(&config, &input, &output)
}

fn cmd_index(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    run_index(&config)
}

fn run_ingest(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let ingestor = BatchIngestor::from_config(&config.ingest)?;
    let report = ingestor.ingest(input, output)?;

    println!("✓ Ingested {} rows from {} files", report.rows, report.files);
    println!("  Table: {}", output.display());
    Ok(())
}

fn run_index(config: &Config) -> Result<()> {
    let embedder = load_embedder(config)?;
    let clusterer = Arc::new(KMeans::new(
        config.clustering.n_init,
        config.clustering.max_iter,
    ));
    let settings = IndexSettings {
        batch_size: config.embedding.batch_size,
        k: config.clustering.k,
        seed: config.clustering.seed,
    };

    let indexer = EmbeddingIndexer::new(embedder, clusterer, settings);
    let matrix = expand_path(&config.paths.embeddings)?;
    let report = indexer.run(&expand_path(&config.paths.table)?, &matrix)?;

    println!(
        "✓ Indexed {} rows ({}D, {} clusters)",
        report.rows, report.dimension, report.clusters
    );
    println!("  Embeddings: {}", matrix.display());
    Ok(())
}

fn cmd_deploy(
    config_path: Option<PathBuf>,
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let endpoint = Endpoint::new(host.unwrap_or_else(|| config.service.host.clone()))
        .with_username(username.or_else(|| config.service.username.clone()));

    if password.is_some() {
        tracing::debug!("Password ignored: the in-process registry does not authenticate");
    }

    let registry = load_registry(&config, endpoint)?;
    let catalog = serde_json::to_string_pretty(&registry.catalog()).map_err(|e| {
        SupplyError::Json {
            source: e,
            context: "Failed to serialize service catalog".to_string(),
        }
    })?;

    println!(
        "✓ Deployed {} functions to {}",
        registry.len(),
        registry.endpoint().host
    );
    println!("{}", catalog);
    Ok(())
}

fn cmd_query(config_path: Option<PathBuf>, service: &str, text: &str) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let registry = load_registry(&config, Endpoint::new(config.service.host.clone()))?;

    let payload = registry.call(service, text)?;
    let json = serde_json::to_string_pretty(&payload).map_err(|e| SupplyError::Json {
        source: e,
        context: format!("Failed to serialize {} payload", service),
    })?;

    println!("{}", json);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| SupplyError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| SupplyError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    tracing::info!("Loading embedding model {}", config.embedding.model);
    let provider = FastEmbedProvider::new(&config.embedding.model, config.embedding.batch_size)?;
    Ok(Arc::new(provider))
}

fn load_registry(config: &Config, endpoint: Endpoint) -> Result<ServiceRegistry> {
    let engine = SimilarityEngine::load(
        &expand_path(&config.paths.table)?,
        &expand_path(&config.paths.embeddings)?,
        load_embedder(config)?,
        EngineSettings::from(&config.scoring),
    )?;

    let mut registry = ServiceRegistry::new(endpoint);
    register_similarity_services(&mut registry, Arc::new(engine), config.scoring.top_n);
    Ok(registry)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| SupplyError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SupplyError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
