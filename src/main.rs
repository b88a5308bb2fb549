use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use strata::memory::store::NewFact;
use strata::memory::types::{Category, FactSource};
use strata::{cli, config, server};

#[derive(Parser)]
#[command(name = "strata", version, about = "Tiered fact memory MCP server with category-TTL cache invalidation")]
struct Cli {
    /// Config file (defaults to ~/.strata/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport unless --http)
    Serve {
        /// Serve streamable HTTP at server.host:server.port/mcp
        #[arg(long)]
        http: bool,
    },
    /// Store a fact
    Learn {
        text: String,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
        #[arg(long, default_value = "manual")]
        source: FactSource,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Ranked search over live facts
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        category: Option<Category>,
    },
    /// Run one TTL sweep
    Sweep {
        #[arg(long)]
        dry_run: bool,
    },
    /// Report on every memory layer
    Insights {
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },
    /// Show the category and TTL for a text, or the whole TTL table
    Classify { text: Option<String> },
    /// Show a fact with its audit history
    Inspect { id: String },
    /// Check database health
    Doctor,
    /// Export all facts as JSON to stdout
    Export,
    /// Import facts from an export file
    Import { file: PathBuf },
    /// Physically remove soft-deleted facts
    Purge {
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete everything
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::StrataConfig::load_from(path)?,
        None => config::StrataConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Learn {
            text,
            category,
            confidence,
            source,
            tags,
        } => {
            let mut fact = NewFact::new(text)
                .confidence(confidence)
                .source(source)
                .tags(tags);
            if let Some(category) = category {
                fact = fact.category(category);
            }
            cli::learn::learn(&config, fact).await?;
        }
        Command::Search {
            query,
            top_k,
            category,
        } => cli::search::search(&config, &query, top_k, category).await?,
        Command::Sweep { dry_run } => cli::sweep::sweep(&config, dry_run).await?,
        Command::Insights { json } => cli::insights::insights(&config, json).await?,
        Command::Classify { text } => cli::classify::classify(&config, text.as_deref())?,
        Command::Inspect { id } => cli::inspect::inspect(&config, &id)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Export => cli::export::export(&config)?,
        Command::Import { file } => cli::import::import(&config, &file).await?,
        Command::Purge {
            older_than_days,
            dry_run,
        } => cli::purge::purge(&config, older_than_days, dry_run).await?,
        Command::Reset => cli::reset::reset(&config)?,
    }

    Ok(())
}
