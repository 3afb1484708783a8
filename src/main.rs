//! # Bookshelf CLI (`shelf`)
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database and run schema migrations |
//! | `shelf serve` | Start the HTTP server |
//! | `shelf search "<topic>"` | Raw search hits for one topic |
//! | `shelf bookshelf <topic>...` | Curated shelf for one or more topics |
//! | `shelf prewarm [<topic>...]` | Fill the caches, locally or on a running server |
//! | `shelf vibe` | Show the active backends |
//!
//! `search`, `bookshelf`, `prewarm` and `vibe` fall back to built-in
//! defaults when the config file does not exist. `init` and `serve`
//! require it.

use anyhow::Result;
use bookshelf::config::{self, Config};
use bookshelf::{bookshelf as shelf, migrate, search, server};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Bookshelf CLI: topic-driven learning resources with web search,
/// LLM curation, and caching.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Bookshelf: curated learning resources for any topic",
    version,
    long_about = "Bookshelf searches the web for learning resources on a list of topics \
    (Tavily, Exa, or DuckDuckGo), scores and summarizes them with Amazon Bedrock, \
    caches the result in S3, and serves it over HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Search the web for one topic and print the raw hits.
    Search {
        topic: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Video results only.
        #[arg(long)]
        video: bool,

        /// Bypass the query cache.
        #[arg(long)]
        fresh: bool,
    },

    /// Build the curated shelf for one or more topics.
    Bookshelf {
        #[arg(required = true)]
        topics: Vec<String>,

        #[arg(long, default_value_t = 3)]
        per_topic: usize,

        /// Keep only `article`, `video` or `book` resources.
        #[arg(long)]
        content_type: Option<String>,

        /// Bypass every cache.
        #[arg(long)]
        refresh: bool,
    },

    /// Warm the caches for the given topics (or the demo topics).
    Prewarm {
        topics: Vec<String>,

        #[arg(long, default_value_t = 3)]
        per_topic: usize,

        /// Base URL of a running server, e.g. `http://localhost:8000`.
        #[arg(long)]
        remote: Option<String>,
    },

    /// Show which search, cache and curation backends are active.
    Vibe,
}

/// Load the config file, or built-in defaults when it does not exist.
fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cfg = config::load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Search {
            topic,
            limit,
            video,
            fresh,
        } => {
            let cfg = load_or_default(&cli.config)?;
            search::run_search(&cfg, &topic, limit, video, fresh).await?;
        }
        Commands::Bookshelf {
            topics,
            per_topic,
            content_type,
            refresh,
        } => {
            let cfg = load_or_default(&cli.config)?;
            shelf::run_bookshelf(&cfg, &topics, per_topic, content_type.as_deref(), refresh).await?;
        }
        Commands::Prewarm {
            topics,
            per_topic,
            remote,
        } => {
            let cfg = load_or_default(&cli.config)?;
            shelf::run_prewarm(&cfg, topics, per_topic, remote.as_deref()).await?;
        }
        Commands::Vibe => {
            let cfg = load_or_default(&cli.config)?;
            shelf::run_vibe(&cfg)?;
        }
    }

    Ok(())
}
