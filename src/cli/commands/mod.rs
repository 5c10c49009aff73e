//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `run`: the incremental import
//! - `state`: status, rewind and config bootstrap

mod run;
mod state;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db;

pub use run::cmd_run;
pub use state::{cmd_init_config, cmd_rewind, cmd_status};

/// Lexicard CLI
#[derive(Parser)]
#[command(author, version, about = "Turn Kindle lookups into enriched Anki flashcards", long_about = None)]
pub struct Cli {
    /// Config file (default: OS config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Import new lookups and append enriched cards to the export file
    Run {
        /// Kindle vocab.db to read
        #[arg(long)]
        vocab_db: Option<PathBuf>,
        /// Anki import file to append to
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Enrich and prune, but write nothing and keep the watermark
        #[arg(long)]
        dry_run: bool,
        /// Stop the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Lookups per batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// OpenAI API key (or set OPENAI_API_KEY env var)
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_api_key: Option<String>,
        /// DeepL API key (or set DEEPL_API_KEY env var)
        #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
        deepl_api_key: Option<String>,
    },
    /// Show the watermark, pending lookups and cache contents
    Status,
    /// Move the watermark back so lookups are imported again
    Rewind {
        /// New watermark in milliseconds since the Unix epoch
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        to: Option<i64>,
        /// Forget the watermark entirely
        #[arg(long)]
        all: bool,
    },
    /// Write a config file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Run {
            vocab_db,
            output,
            dry_run,
            timeout_secs,
            batch_size,
            openai_api_key,
            deepl_api_key,
        } => {
            let mut config = config::load(config_path);
            if let Some(path) = vocab_db {
                config.paths.vocab_db = path.clone();
            }
            if let Some(path) = output {
                config.paths.export_file = path.clone();
            }
            if let Some(size) = batch_size {
                config.pipeline.batch_size = *size;
            }
            if openai_api_key.is_some() {
                config.credentials.openai_api_key = openai_api_key.clone();
            }
            if deepl_api_key.is_some() {
                config.credentials.deepl_api_key = deepl_api_key.clone();
            }
            cmd_run(&rt, &config, *dry_run, timeout_secs.map(std::time::Duration::from_secs))
        }
        Commands::Status => cmd_status(&rt, &config::load(config_path)),
        Commands::Rewind { to, all } => {
            let target = if *all { None } else { *to };
            cmd_rewind(&rt, &config::load(config_path), target)
        }
        Commands::InitConfig { force } => cmd_init_config(config_path, *force),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open the state database, creating its directory if needed.
pub(crate) async fn open_state(config: &Config) -> anyhow::Result<SqlitePool> {
    let path = config.paths.state_db();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {:?}", dir))?;
    }
    db::init_db(&db::db_url(Some(&path)))
        .await
        .with_context(|| format!("Failed to open state database {:?}", path))
}
