//! FACTBANK CLI
//!
//! Manage fact banks, search them and print their neighbor graphs.

use anyhow::Context;
use clap::{Parser, Subcommand};
use factbank::{BankService, Config, HashingLoader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// FACTBANK - Embedding Cache for Fact Banks
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Snapshot file for the store (in-memory only if omitted)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Dimension of the hashing model
    #[arg(long, default_value_t = 768)]
    model_dimension: usize,

    /// Neighbors per graph node
    #[arg(short, long, default_value_t = 3)]
    neighbors: usize,

    /// Minimum similarity for a graph edge
    #[arg(short, long, default_value_t = 0.1)]
    threshold: f32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List built-in and custom banks
    Banks,
    /// Create or replace a custom bank from a file, one fact per line
    Add { name: String, file: PathBuf },
    /// Delete a custom bank
    Remove { name: String },
    /// Rank a bank's facts against a query
    Search { bank: String, query: String },
    /// Print the neighbor graph of a bank
    Graph { bank: String },
    /// Embed every bank whose cache is stale
    Warm,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("factbank=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = Config::default()
        .with_neighbors(args.neighbors)
        .with_threshold(args.threshold);
    if let Some(path) = &args.snapshot {
        config = config.with_snapshot_path(path.clone());
    }

    let loader = Arc::new(HashingLoader::new().with_dimension(args.model_dimension));
    let service = BankService::from_config(&config, loader);

    match args.command {
        Commands::Banks => {
            for bank in service.list_banks().await? {
                println!(
                    "{:<20} {:<9} {} facts",
                    bank.name,
                    bank.kind.to_string(),
                    bank.entries
                );
            }
        }
        Commands::Add { name, file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let records = service.create_custom_bank(&name, &raw).await?;
            println!("Saved '{}' with {} facts", name.trim(), records.len());
        }
        Commands::Remove { name } => {
            let removed = service.delete_custom_bank(&name).await?;
            println!("Deleted '{}' ({} records)", name, removed);
        }
        Commands::Search { bank, query } => {
            for (i, fact) in service.search(&bank, &query).await?.iter().enumerate() {
                println!(
                    "{:>2}. [{:.3} {}] {}",
                    i + 1,
                    fact.score,
                    fact.relevance(),
                    fact.text
                );
            }
        }
        Commands::Graph { bank } => {
            let bank = service.neighbor_graph(&bank).await?;
            for (i, text) in bank.texts.iter().enumerate() {
                println!("[{}] {}", i, text);
            }
            for (source, neighbor) in bank.graph.edges() {
                println!("{:>3} -> {:<3} {:.3}", source, neighbor.index, neighbor.score);
            }
            info!(
                nodes = bank.graph.len(),
                edges = bank.graph.edge_count(),
                "Graph built"
            );
        }
        Commands::Warm => {
            let summary = service.warm_up().await?;
            println!(
                "{} unchanged, {} re-embedded, {} failed",
                summary.unchanged.len(),
                summary.reembedded.len(),
                summary.failed.len()
            );
            for (bank, err) in &summary.failed {
                eprintln!("  {}: {}", bank, err);
            }
        }
    }

    debug!(store = %service.store().metrics().summary(), "Store metrics");
    Ok(())
}
