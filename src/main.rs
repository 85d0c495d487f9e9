//! # QA Harness CLI (`qa`)
//!
//! Builds a knowledge base from project documentation and uses it to ground
//! generated test cases and Selenium scripts.
//!
//! ## Usage
//!
//! ```bash
//! qa --config ./config/qa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qa build <paths..>` | Load, chunk, and embed documents, replacing the index |
//! | `qa status` | Show whether an index exists and what built it |
//! | `qa search "<query>"` | Show the chunks retrieved for a query |
//! | `qa test-cases "<request>"` | Generate test cases grounded in the docs |
//! | `qa script "<test case>" --html page.html` | Generate a Selenium script |
//! | `qa serve` | Start the HTTP API |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use qa_harness::config::{self, Config};
use qa_harness::files::collect_files;
use qa_harness::knowledge::{KbStatus, KnowledgeBase};
use qa_harness::server;
use qa_harness::store::IndexStore;

const DEFAULT_CONFIG: &str = "./config/qa.toml";

/// QA Harness: documentation-grounded test case and script generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/qa.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "qa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/qa.toml`; built-in defaults are used when that
    /// file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge base from files and directories.
    ///
    /// Directories are walked using the `[files]` globs. The new index
    /// replaces the previous one entirely.
    Build {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show the persisted index state.
    Status,

    /// Print the chunks retrieved for a query.
    Search {
        query: String,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Generate test cases for a feature request.
    TestCases { request: String },

    /// Generate a Selenium script for one test case.
    Script {
        test_case: String,

        /// HTML file of the page under test.
        #[arg(long)]
        html: PathBuf,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => {
            tracing::warn!("no config at {}, using defaults", DEFAULT_CONFIG);
            Ok(Config::minimal())
        }
    }
}

/// Open the knowledge base for a query command; fails if nothing was built.
async fn open_built(cfg: &Config) -> anyhow::Result<KnowledgeBase> {
    let kb = KnowledgeBase::open(cfg).await?;
    if matches!(kb.status().await, KbStatus::Empty) {
        anyhow::bail!(
            "No index found at {}. Run `qa build <paths..>` first.",
            cfg.index.dir.display()
        );
    }
    Ok(kb)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { paths } => {
            let files = collect_files(&paths, &cfg.files)?;
            if files.is_empty() {
                anyhow::bail!("No matching files found.");
            }
            let mut build_cfg = cfg.clone();
            build_cfg.index.load_on_start = false;
            let kb = KnowledgeBase::open(&build_cfg).await?;
            let report = kb.build_knowledge_base(&files).await?;
            println!(
                "Knowledge base built: {} files, {} chunks ({} model, {} dims).",
                report.files, report.chunks, report.model, report.dims
            );
        }
        Commands::Status => {
            let store = IndexStore::new(cfg.index.dir.clone());
            match store.metadata().await? {
                Some(meta) => {
                    println!("Index: {}", store.dir().display());
                    println!("  model:    {}", meta.model);
                    println!("  dims:     {}", meta.dims);
                    println!("  entries:  {}", meta.entries);
                    println!("  built at: {}", meta.built_at.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                None => println!("No index built yet ({}).", store.dir().display()),
            }
        }
        Commands::Search { query, k } => {
            let kb = open_built(&cfg).await?;
            let hits = kb.retrieve(&query, k).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} (chunk {}, chars {}..{})",
                    i + 1,
                    hit.score,
                    hit.chunk.source,
                    hit.chunk.chunk_index,
                    hit.chunk.start,
                    hit.chunk.end
                );
                println!("    {}", hit.chunk.text.replace('\n', " "));
                println!();
            }
        }
        Commands::TestCases { request } => {
            let kb = open_built(&cfg).await?;
            println!("{}", kb.generate_test_cases(&request).await?);
        }
        Commands::Script { test_case, html } => {
            let html = std::fs::read_to_string(&html)
                .with_context(|| format!("Failed to read HTML file: {}", html.display()))?;
            let kb = open_built(&cfg).await?;
            println!("{}", kb.generate_script(&test_case, &html).await?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
