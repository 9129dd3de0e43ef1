//! # Palma CLI (`palma`)
//!
//! Crawls a documentation site and keeps its chunks in a Pinecone index
//! up to date, writing only what changed since the last run.
//!
//! ## Usage
//!
//! ```bash
//! palma --config ./config/palma.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `palma sync [URL]` | Crawl `URL` and apply the delta to its namespace |
//! | `palma verify` | Check credentials and print index statistics |
//!
//! Credentials come from `OPENAI_API_KEY`, `PINECONE_API_KEY`,
//! `PINECONE_INDEX` and `TAVILY_API_KEY`. Log verbosity follows `RUST_LOG`.
//!
//! ## Examples
//!
//! ```bash
//! # Preview what a sync would change
//! palma sync https://demo.bookstackapp.com/ --dry-run
//!
//! # Shallow crawl with smaller mutation batches
//! palma sync https://docs.example.com/ --max-depth 2 --batch-size 20
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use palma_sync::config;
use palma_sync::ingest;
use palma_sync::pipeline::SyncRequest;
use palma_sync::progress::ProgressMode;

const DEFAULT_URL: &str = "https://demo.bookstackapp.com/";

/// Palma: incremental crawl-to-vector-store sync.
#[derive(Parser)]
#[command(
    name = "palma",
    about = "Incremental crawl-to-vector-store sync",
    version,
    long_about = "Palma crawls a site, splits pages into positionally identified chunks, \
    and diffs their checksums against what the vector store already holds, so that each \
    run only adds, updates or deletes the chunks that changed."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/palma.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/palma.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtractDepth {
    Basic,
    Advanced,
}

impl ExtractDepth {
    fn as_str(self) -> &'static str {
        match self {
            ExtractDepth::Basic => "basic",
            ExtractDepth::Advanced => "advanced",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a site and sync its chunks.
    ///
    /// The seed URL is also the store namespace. Only new, changed and
    /// removed chunks are written.
    Sync {
        /// Seed URL.
        #[arg(default_value = DEFAULT_URL)]
        url: String,

        /// Maximum crawl depth. Defaults to `crawler.max_depth`.
        #[arg(long)]
        max_depth: Option<u32>,

        /// Extraction depth. Defaults to `crawler.extract_depth`.
        #[arg(long, value_enum)]
        extract_depth: Option<ExtractDepth>,

        /// Items per store mutation. Defaults to `sync.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Compute and print the delta without writing.
        #[arg(long)]
        dry_run: bool,

        /// Emit progress events as JSON lines on stderr.
        #[arg(long)]
        json_progress: bool,
    },

    /// Check credentials and print index statistics.
    Verify,
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
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync {
            url,
            max_depth,
            extract_depth,
            batch_size,
            dry_run,
            json_progress,
        } => {
            if let Some(size) = batch_size {
                cfg.sync.batch_size = size;
                config::validate(&cfg)?;
            }
            let request = SyncRequest::new(
                url,
                max_depth.unwrap_or(cfg.crawler.max_depth),
                extract_depth
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_else(|| cfg.crawler.extract_depth.clone()),
            );
            let mode = if json_progress {
                ProgressMode::Json
            } else {
                ProgressMode::default_for_tty()
            };
            ingest::run_sync(&cfg, &request, dry_run, mode.reporter()).await?;
        }
        Commands::Verify => {
            ingest::run_verify(&cfg).await?;
        }
    }

    Ok(())
}
