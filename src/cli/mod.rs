//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "supplysim",
    version,
    about = "Purchase-order similarity: ingest, embed, cluster and serve lookups",
    long_about = "supplysim consolidates purchase-order transaction exports into one canonical \
                  table, embeds and clusters product descriptions, and deploys similarity \
                  lookups (top matches, competitors, clusters, pricing, supplier and buyer \
                  summaries) as named functions."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/supplysim/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the canonical table from scratch, then embed and cluster it
    Build,

    /// Append every export of the transactions directory to the table
    Ingest {
        /// Directory of raw exports (defaults to paths.transactions_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output table (defaults to paths.table)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Embed and cluster an existing table
    Index,

    /// Register the similarity functions and print the deployed catalog
    Deploy {
        /// Service host (defaults to service.host)
        #[arg(long)]
        host: Option<String>,

        /// Service username
        #[arg(short, long)]
        username: Option<String>,

        /// Service password (ignored by the in-process registry)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Call one deployed function locally and print its JSON payload
    Query {
        /// Function name (e.g. get_top_matches)
        service: String,

        /// Free-text product description
        text: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
