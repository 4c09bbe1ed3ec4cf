//! # Ambient Context CLI (`ambient`)
//!
//! ## Usage
//!
//! ```bash
//! ambient --config ./config/ambient.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ambient serve` | Start the HTTP API |
//! | `ambient search "<query>"` | Print ranked retrieval hits |
//! | `ambient suggest "<draft>" --recipient <id>` | Print one context card as JSON |
//! | `ambient index` | Build the index and print its stats |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ambient_context::config::{self, Config};
use ambient_context::engine::ContextEngine;
use ambient_context::search::SearchArgs;
use ambient_context::types::ContextMode;
use ambient_context::{index_cmd, search, server, suggest};

/// Ambient Context: context cards for chat drafts, backed by a local
/// knowledge corpus.
#[derive(Parser)]
#[command(name = "ambient", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/ambient.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve,

    /// Run retrieval for a query and print ranked hits.
    Search {
        query: String,

        /// Recipient id to bias toward.
        #[arg(long)]
        recipient: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        min_score: Option<f64>,

        /// Disable recipient bias.
        #[arg(long)]
        no_bias: bool,
    },

    /// Run one draft through the engine and print the card.
    Suggest {
        draft: String,

        #[arg(long)]
        recipient: String,

        /// `compose` or `incoming_lookup`.
        #[arg(long, default_value = "compose")]
        mode: ContextMode,

        #[arg(long)]
        channel: Option<String>,
    },

    /// Build the index and print its stats.
    Index,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Serve => {
            let engine = ContextEngine::from_config(&cfg)?;
            let stats = engine.warm_up();
            tracing::info!(items = stats.items, chunks = stats.chunks, "index ready");
            server::run_server(engine, &cfg.server.bind).await?;
        }
        Commands::Search {
            query,
            recipient,
            limit,
            min_score,
            no_bias,
        } => {
            search::run_search(
                &cfg,
                &query,
                &SearchArgs {
                    recipient,
                    limit,
                    min_score,
                    no_bias,
                },
            )?;
        }
        Commands::Suggest {
            draft,
            recipient,
            mode,
            channel,
        } => {
            suggest::run_suggest(&cfg, &draft, &recipient, mode, channel).await?;
        }
        Commands::Index => {
            index_cmd::run_index(&cfg)?;
        }
    }

    Ok(())
}
