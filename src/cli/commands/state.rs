//! Import state and config commands.

use std::path::Path;
use tokio::runtime::Runtime;

use crate::cache::StageCache;
use crate::config::{self, Config};
use crate::model::Watermark;
use crate::source::KindleVocabSource;
use crate::tracker::ImportTracker;

use super::open_state;

/// Show the watermark, pending lookups and cache contents
pub fn cmd_status(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(async {
        let pool = open_state(config).await?;
        let tracker = ImportTracker::new(pool.clone(), KindleVocabSource::NAME);
        let watermark = tracker.read_watermark().await?;

        println!("State database: {:?}", config.paths.state_db());
        println!("Export file:    {:?}", config.paths.export_file);
        println!("Last import:    {}", watermark);

        match KindleVocabSource::open(&config.paths.vocab_db).await {
            Ok(source) => {
                let (pending, total) = source.count_since(watermark).await?;
                println!("New lookups:    {} (of {} total)", pending, total);
            }
            Err(e) => println!("Vocab database: {}", e),
        }

        let stats = StageCache::new(pool).stats().await?;
        if stats.is_empty() {
            println!("Cache:          empty");
        } else {
            println!("Cache:");
            for (task, count) in stats {
                println!("  {:<12} {}", task, count);
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Move the watermark back. `None` resets it to the beginning.
pub fn cmd_rewind(rt: &Runtime, config: &Config, to: Option<i64>) -> anyhow::Result<()> {
    let target = to.map(Watermark).unwrap_or(Watermark::ORIGIN);

    rt.block_on(async {
        let pool = open_state(config).await?;
        let tracker = ImportTracker::new(pool, KindleVocabSource::NAME);
        let before = tracker.read_watermark().await?;
        tracker.rewind(target).await?;
        println!("✓ Watermark: {} -> {}", before, target);
        Ok::<(), anyhow::Error>(())
    })
}

/// Write a config file with default values
pub fn cmd_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let target = match path {
        Some(p) => p.to_path_buf(),
        None => config::config_path().ok_or(config::ConfigError::NoConfigDir)?,
    };

    if target.exists() && !force {
        println!("Config already exists at {:?} (use --force to overwrite)", target);
        return Ok(());
    }

    let written = config::save(&Config::default(), Some(&target))?;
    println!("✓ Wrote default config to {:?}", written);
    println!("  Set credentials.openai_api_key or OPENAI_API_KEY before running an import.");
    Ok(())
}
