mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use semstore::config::SemstoreConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "semstore", version, about = "SPARQL-backed semantic memory store")]
struct Cli {
    /// Config file (defaults to ~/.semstore/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check endpoint reachability and print a health report
    Doctor,
    /// Print history counts and index mapping statistics
    Stats,
    /// Write the stored history as JSON to stdout
    Export,
    /// Replace the stored history with an exported JSON file
    Import {
        file: PathBuf,
    },
    /// List short-term interactions most similar to a stored one
    Similar {
        /// Id of the interaction whose embedding is the query
        id: String,
        /// Number of neighbours
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },
    /// Build the similarity index from stored history and write it to a file
    Index {
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SemstoreConfig::load_from(path)?,
        None => SemstoreConfig::load()?,
    };

    // Log to stderr so stdout stays clean for `export`.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Stats => cli::stats::stats(&config).await?,
        Command::Export => cli::export::export(&config).await?,
        Command::Import { file } => cli::import::import(&config, &file).await?,
        Command::Similar { id, k } => cli::search::similar(&config, &id, k).await?,
        Command::Index { out } => cli::index::write_index(&config, &out).await?,
    }

    Ok(())
}
