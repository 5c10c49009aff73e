//! The import command.

use anyhow::Context;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::enrichment::registry;
use crate::error::Error;
use crate::pipeline::{Importer, RunReport};
use crate::pruning::Pruner;
use crate::sink::TsvSink;
use crate::source::{KindleVocabSource, LookupSource};
use crate::tracker::ImportTracker;

use super::open_state;

/// Import new lookups from the Kindle database
pub fn cmd_run(
    rt: &Runtime,
    config: &Config,
    dry_run: bool,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    config.validate()?;

    rt.block_on(async {
        let source = KindleVocabSource::open(&config.paths.vocab_db)
            .await
            .with_context(|| format!("Cannot read {:?}", config.paths.vocab_db))?;
        let pool = open_state(config).await?;
        let tracker = ImportTracker::new(pool.clone(), source.name());

        let watermark = tracker.read_watermark().await?;
        let (pending, total) = source.count_since(watermark).await?;
        println!("Last import:  {}", watermark);
        println!("New lookups:  {} (of {} total)", pending, total);
        if pending == 0 {
            println!("✓ Nothing to import");
            return Ok(());
        }

        let pipeline = registry::build_pipeline(config, pool)?;
        let pruner = Pruner::new(config.pruning.similarity_threshold);
        let sink = TsvSink::new(&config.paths.export_file);
        let importer = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .batch_size(config.pipeline.batch_size)
            .dry_run(dry_run);

        let report = until_interrupted(importer.run(), timeout).await?;
        print_report(&report, &sink);
        Ok::<(), anyhow::Error>(())
    })
}

/// Drive `run` until it finishes, Ctrl-C is pressed, or `timeout` expires.
///
/// Dropping the run future is safe: cached stage results stay valid and the
/// watermark only covers delivered batches.
async fn until_interrupted<T>(
    run: impl Future<Output = crate::error::Result<T>>,
    timeout: Option<Duration>,
) -> crate::error::Result<T> {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping import");
            Err(Error::Cancelled)
        }
        _ = deadline => Err(Error::TimedOut(timeout.unwrap_or_default())),
    }
}

fn print_report(report: &RunReport, sink: &TsvSink) {
    println!();
    if report.dry_run {
        println!("Dry run - nothing was written");
        println!("  Would deliver:   {}", report.delivered);
    } else {
        println!("✓ Delivered {} cards to {:?}", report.delivered, sink.path());
    }
    println!("  Lookups:         {}", report.lookups);
    println!("  Merged:          {}", report.merged);
    println!("  Already synced:  {}", report.already_synced);

    if !report.failures.is_empty() {
        println!();
        println!("✗ {} lookups failed:", report.failures.len());
        for failure in &report.failures {
            let next = if failure.retryable {
                "will retry next run"
            } else {
                "skipped"
            };
            println!(
                "  {} ({}): {} [{}]",
                failure.lookup_id, failure.expression, failure.reason, next
            );
        }
    }

    println!();
    println!(
        "Watermark: {} -> {}",
        report.watermark_before, report.watermark_after
    );
}
