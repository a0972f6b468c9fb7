//! # a11y-assist CLI (`a11y`)
//!
//! Commands for building the retrieval index, inspecting retrieval,
//! running one-shot revisions, and serving the web UI.
//!
//! ## Usage
//!
//! ```bash
//! a11y --config ./config/a11y.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `a11y index` | Build the index for the configured guideline document (no-op if it exists) |
//! | `a11y search "<query>"` | Show the guideline chunks retrieved for a query |
//! | `a11y revise` | Revise a snippet once and print the result |
//! | `a11y serve` | Start the web UI / JSON API server |

mod assist;
mod chunk;
mod config;
mod embedding;
mod error;
mod generation;
mod models;
mod prompts;
mod server;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::assist::Assistant;
use crate::generation::GenerationClient;
use crate::models::EditRequest;
use crate::store::RetrievalIndex;

/// a11y-assist: revise HTML against accessibility guidelines, grounded in
/// retrieved guideline passages.
#[derive(Parser)]
#[command(
    name = "a11y",
    about = "Retrieval-grounded assistant for revising HTML toward accessibility compliance",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/a11y.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the retrieval index for the configured guideline document.
    ///
    /// Reuses a persisted index when one exists; this command only embeds
    /// on first use (or when the freshness policy demands a rebuild).
    Index {
        /// Delete any persisted index and build from scratch.
        #[arg(long)]
        rebuild: bool,
    },

    /// Show the guideline chunks retrieved for a query.
    Search {
        /// The search query string.
        query: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Revise a snippet once and print the revised code and explanation.
    Revise {
        /// The natural-language edit request.
        #[arg(long)]
        instruction: String,

        /// HTML code to revise, inline.
        #[arg(long, conflicts_with = "code_file")]
        code: Option<String>,

        /// Read the HTML code from a file instead.
        #[arg(long)]
        code_file: Option<PathBuf>,
    },

    /// Start the web UI / JSON API server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index { rebuild } => {
            let index = if rebuild {
                RetrievalIndex::rebuild(&cfg).await?
            } else {
                RetrievalIndex::ensure(&cfg).await?
            };
            println!("index ready");
            println!("  location: {}", index.location().display());
            println!("  chunks: {}", index.chunk_count());
            println!("  model: {}", index.meta().embedding_model);
        }
        Commands::Search { query, k } => {
            let index = RetrievalIndex::ensure(&cfg).await?;
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let results = index.search(&query, k).await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] chunk {}",
                    i + 1,
                    result.score,
                    result.chunk_index
                );
                println!("    \"{}\"", result.text.replace('\n', " ").trim());
                println!();
            }
        }
        Commands::Revise {
            instruction,
            code,
            code_file,
        } => {
            let code = match (code, code_file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (None, None) => anyhow::bail!("Provide --code or --code-file"),
            };

            let index = RetrievalIndex::ensure(&cfg).await?;
            let generator = GenerationClient::new(&cfg.generation)?;
            let assistant = Assistant::new(Arc::new(index), generator, &cfg);

            let state = assistant.handle(&EditRequest { instruction, code }).await;

            if let Some(error) = state.error {
                anyhow::bail!("{}", error);
            }

            println!("{}", state.revised_code.unwrap_or_default());
            if let Some(explanation) = state.explanation {
                println!();
                println!("--- explanation ---");
                println!("{}", explanation);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
