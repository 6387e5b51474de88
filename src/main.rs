//! # site-context CLI (`site-ctx`)
//!
//! Builds the embedding index for a personal website and answers visitor
//! questions grounded in it, from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! site-ctx --config ./config/site-context.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `site-ctx build` | Chunk and embed the site, write the index |
//! | `site-ctx search "<query>"` | Show the chunks and context retrieved for a query |
//! | `site-ctx ask "<question>"` | Answer a question through the full pipeline |
//! | `site-ctx stats` | Summarise the current index |
//! | `site-ctx serve` | Start the chat HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what would be indexed
//! site-ctx build --dry-run
//!
//! # Build with machine-readable progress
//! site-ctx build --progress json
//!
//! # Inspect retrieval, one chunk per page
//! site-ctx search "recent projects" --diverse
//!
//! # Serve the chat endpoint
//! RUST_LOG=site_context=debug site-ctx serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use site_context::config::{self, DEFAULT_CONFIG_PATH};
use site_context::progress::ProgressMode;
use site_context::{builder, search, server, stats};

/// site-context: retrieval-augmented chat for a personal website.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/site-context.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "site-ctx",
    about = "site-context: retrieval-augmented chat for a personal website",
    version,
    long_about = "site-context splits the pages and notes of a website into addressable chunks, \
    embeds them into a versioned JSON index, and answers visitor questions by retrieving the \
    most similar chunks and handing them to a generative model."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the default path does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from the site's documents.
    ///
    /// Walks the document root, splits each page into chunks, embeds every
    /// chunk and replaces the index file in one atomic write.
    Build {
        /// Document root (overrides `[build].root`).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Index file to write (overrides `[index].path`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show which chunks a query retrieves and the context they form.
    Search {
        query: String,

        /// Maximum chunks to select (overrides `[retrieval].top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// At most one chunk per page or top-level directory.
        #[arg(long)]
        diverse: bool,
    },

    /// Answer a question using the index and the generation provider.
    Ask { question: String },

    /// Print a summary of the current index.
    Stats,

    /// Start the chat HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Build {
            root,
            output,
            dry_run,
            progress,
        } => {
            builder::run_build(&cfg, root, output, dry_run, progress).await?;
        }
        Commands::Search {
            query,
            top_k,
            diverse,
        } => {
            search::run_search(&cfg, &query, top_k, diverse).await?;
        }
        Commands::Ask { question } => {
            search::run_ask(&cfg, &question).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
