//! Lexicard - turns Kindle vocabulary lookups into enriched Anki flashcards.
//!
//! Lookups are read incrementally from the device's `vocab.db`, run through
//! a chain of language-model stages (lexical unit, sense, translation,
//! collocations, hint), deduplicated, and appended to an Anki import file.

pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod pruning;
pub mod sink;
pub mod source;
#[cfg(test)]
pub mod test_utils;
pub mod text;
pub mod tracker;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("lexicard=info".parse()?))
        .init();

    cli::run_command(&args)
}
