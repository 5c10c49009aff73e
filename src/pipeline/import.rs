//! One incremental import run.
//!
//! Lookups newer than the stored watermark are read in batches. Each batch
//! is enriched, pruned against itself and the sink's history, and
//! delivered. The watermark then moves to the newest timestamp that is
//! settled with nothing unsettled at or before it:
//! - delivered and accepted: settled
//! - already in the sink, or a duplicate of a synced card: settled
//! - merged into another card: follows that card
//! - failed fatally: settled, reported, not retried
//! - failed after exhausting retries, or rejected by the sink: unsettled
//!
//! Unsettled lookups therefore come back on the next run.

use futures::TryStreamExt;
use futures::stream::TryChunksError;
use std::collections::{BTreeSet, HashMap};

use super::service::Pipeline;
use crate::error::{Error, Result, ResultExt};
use crate::model::{RawLookup, Watermark};
use crate::pruning::{PruneDecision, PruneOutcome, Pruner};
use crate::sink::{CardSink, DeliveryStatus};
use crate::source::LookupSource;
use crate::tracker::{ImportTracker, settled_watermark};

/// Default number of lookups per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A lookup that did not produce a delivered card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub lookup_id: String,
    pub expression: String,
    pub reason: String,
    /// Will come back on the next run
    pub retryable: bool,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub dry_run: bool,
    pub watermark_before: Watermark,
    pub watermark_after: Watermark,
    pub lookups: usize,
    /// Cards accepted by the sink (would be delivered, in a dry run)
    pub delivered: usize,
    pub merged: usize,
    pub already_synced: usize,
    pub failures: Vec<FailureReport>,
}

impl RunReport {
    fn new(watermark: Watermark, dry_run: bool) -> Self {
        Self {
            dry_run,
            watermark_before: watermark,
            watermark_after: watermark,
            lookups: 0,
            delivered: 0,
            merged: 0,
            already_synced: 0,
            failures: Vec::new(),
        }
    }

    pub fn retryable_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.retryable).count()
    }
}

/// Where a pruned card ended up.
#[derive(Debug, Clone, Copy)]
enum CardFate<'a> {
    /// Already in the sink, nothing to deliver
    InSink,
    /// Handed to the sink; `None` when it was not (dry run) or got no report
    Delivered(Option<&'a DeliveryStatus>),
}

/// Drives source → pipeline → pruning → sink → tracker.
pub struct Importer<'a> {
    source: &'a dyn LookupSource,
    pipeline: &'a Pipeline,
    pruner: &'a Pruner,
    sink: &'a dyn CardSink,
    tracker: &'a ImportTracker,
    batch_size: usize,
    dry_run: bool,
}

impl<'a> Importer<'a> {
    pub fn new(
        source: &'a dyn LookupSource,
        pipeline: &'a Pipeline,
        pruner: &'a Pruner,
        sink: &'a dyn CardSink,
        tracker: &'a ImportTracker,
    ) -> Self {
        Self {
            source,
            pipeline,
            pruner,
            sink,
            tracker,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Enrich and prune, but deliver nothing and keep the watermark.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> Result<RunReport> {
        let before = self
            .tracker
            .read_watermark()
            .await
            .with_context("reading import watermark")?;
        let mut report = RunReport::new(before, self.dry_run);
        tracing::info!(
            source = self.source.name(),
            sink = self.sink.name(),
            watermark = %before,
            dry_run = self.dry_run,
            "Starting import"
        );

        // (timestamp, settled) for every lookup seen so far
        let mut ledger: Vec<(i64, bool)> = Vec::new();
        let mut batches = self
            .source
            .lookups_since(before)
            .try_chunks(self.batch_size);
        let mut batch_number = 0usize;

        while let Some(mut batch) = batches
            .try_next()
            .await
            .map_err(|TryChunksError(_, e)| {
                Error::Source(e).context(format!("reading lookups from {}", self.source.name()))
            })?
        {
            batch.retain(|lookup| !before.covers(lookup.timestamp));
            if batch.is_empty() {
                continue;
            }
            batch_number += 1;
            tracing::info!(batch = batch_number, lookups = batch.len(), "Processing batch");

            let settled = self.process_batch(&batch, &mut report).await?;
            ledger.extend(
                batch
                    .iter()
                    .map(|l| (l.timestamp, settled.get(&l.id).copied().unwrap_or(false))),
            );

            // Lookups at the batch's last timestamp may continue in the next batch
            let boundary = batch.last().map(|l| l.timestamp);
            let provisional: Vec<(i64, bool)> = ledger
                .iter()
                .map(|&(ts, ok)| (ts, ok && Some(ts) != boundary))
                .collect();
            self.checkpoint(&provisional, &mut report).await?;
        }

        self.checkpoint(&ledger, &mut report).await?;

        tracing::info!(
            lookups = report.lookups,
            delivered = report.delivered,
            merged = report.merged,
            already_synced = report.already_synced,
            failures = report.failures.len(),
            watermark = %report.watermark_after,
            "Import finished"
        );
        Ok(report)
    }

    /// Enrich, prune and deliver one batch. Returns settled state per lookup id.
    async fn process_batch(
        &self,
        batch: &[RawLookup],
        report: &mut RunReport,
    ) -> Result<HashMap<String, bool>> {
        report.lookups += batch.len();
        let mut settled: HashMap<String, bool> = HashMap::with_capacity(batch.len());

        let outcome = self.pipeline.process_batch(batch).await;
        for failure in &outcome.failures {
            settled.insert(failure.lookup_id.clone(), !failure.is_retryable());
            report.failures.push(FailureReport {
                lookup_id: failure.lookup_id.clone(),
                expression: failure.word.clone(),
                reason: format!("{} stage: {}", failure.stage, failure.error),
                retryable: failure.is_retryable(),
            });
        }

        let expressions: Vec<String> = outcome
            .cards
            .iter()
            .map(|c| c.expression.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let synced = if expressions.is_empty() {
            Vec::new()
        } else {
            self.sink
                .synced_cards(&expressions)
                .await
                .with_context(format!("reading synced cards from {}", self.sink.name()))?
        };

        let expression_of: HashMap<String, String> = outcome
            .cards
            .iter()
            .map(|c| (c.lookup_id.clone(), c.expression.clone()))
            .collect();
        let pruned = self.pruner.prune(outcome.cards, &synced);
        report.merged += pruned.merged();
        report.already_synced += pruned.already_synced();

        let delivery = self.deliver(&pruned).await?;
        report.delivered += if self.dry_run {
            pruned.survivors.len()
        } else {
            delivery
                .values()
                .filter(|s| **s == DeliveryStatus::Accepted)
                .count()
        };

        // Fate of every card that was not merged, so merged members can follow their survivor
        let fate_of: HashMap<&str, CardFate<'_>> = pruned
            .decisions
            .iter()
            .filter_map(|d| {
                let fate = match &d.decision {
                    PruneDecision::AlreadySynced | PruneDecision::DuplicateOfSynced { .. } => {
                        CardFate::InSink
                    }
                    PruneDecision::Keep | PruneDecision::KeepDistinctSense { .. } => {
                        CardFate::Delivered(delivery.get(&d.uid))
                    }
                    PruneDecision::MergedInto { .. } => return None,
                };
                Some((d.uid.as_str(), fate))
            })
            .collect();

        for decision in &pruned.decisions {
            let uid = match &decision.decision {
                PruneDecision::MergedInto { survivor, .. } => survivor.as_str(),
                _ => decision.uid.as_str(),
            };
            match fate_of.get(uid).copied().unwrap_or(CardFate::Delivered(None)) {
                CardFate::InSink | CardFate::Delivered(Some(DeliveryStatus::Accepted)) => {
                    settled.insert(decision.lookup_id.clone(), true);
                }
                CardFate::Delivered(Some(DeliveryStatus::Rejected(reason))) => {
                    tracing::warn!(lookup = %decision.lookup_id, uid = %decision.uid, "Card rejected by sink: {}", reason);
                    settled.insert(decision.lookup_id.clone(), false);
                    report.failures.push(FailureReport {
                        lookup_id: decision.lookup_id.clone(),
                        expression: expression_of
                            .get(&decision.lookup_id)
                            .cloned()
                            .unwrap_or_default(),
                        reason: format!("rejected by sink: {}", reason),
                        retryable: true,
                    });
                }
                // Dry run, or the sink did not report on this card
                CardFate::Delivered(None) => {
                    settled.insert(decision.lookup_id.clone(), false);
                }
            }
        }

        Ok(settled)
    }

    /// Delivery status by uid. A dry run delivers nothing.
    async fn deliver(&self, pruned: &PruneOutcome) -> Result<HashMap<String, DeliveryStatus>> {
        if self.dry_run {
            tracing::info!(cards = pruned.survivors.len(), "Dry run, not delivering");
            return Ok(HashMap::new());
        }
        if pruned.survivors.is_empty() {
            return Ok(HashMap::new());
        }

        let reports = self
            .sink
            .deliver(&pruned.survivors)
            .await
            .with_context(format!("delivering to {}", self.sink.name()))?;
        Ok(reports.into_iter().map(|r| (r.uid, r.status)).collect())
    }

    async fn checkpoint(&self, records: &[(i64, bool)], report: &mut RunReport) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        if let Some(mark) = settled_watermark(records)
            && mark > report.watermark_after
        {
            report.watermark_after = self
                .tracker
                .advance(mark)
                .await
                .with_context("advancing import watermark")?;
            tracing::debug!(watermark = %report.watermark_after, "Watermark advanced");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::domain::{ProviderError, SenseResponse};
    use crate::enrichment::tasks::SenseTask;
    use crate::enrichment::traits::mocks::ScriptedRuntime;
    use crate::sink::mocks::MemorySink;
    use crate::source::mocks::MemorySource;
    use crate::test_utils::{MockStages, lookup, temp_db, test_pipeline};
    use std::sync::Arc;

    fn five_lookups() -> Vec<RawLookup> {
        vec![
            lookup("l1", "kot", "Kot śpi.", 1_000),
            lookup("l2", "pies", "Pies szczeka.", 2_000),
            lookup("l3", "dom", "Dom stoi.", 3_000),
            lookup("l4", "las", "Las szumi.", 4_000),
            lookup("l5", "rzeka", "Rzeka płynie.", 5_000),
        ]
    }

    #[tokio::test]
    async fn test_sink_rejection_holds_watermark_and_records_return() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let pipeline = test_pipeline(pool.clone(), mocks.stages());
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let source = MemorySource::new(five_lookups());
        let sink = MemorySink::new();
        sink.reject_expression("dom");

        let report = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .batch_size(2)
            .run()
            .await
            .unwrap();

        assert_eq!(report.lookups, 5);
        assert_eq!(report.delivered, 4);
        assert!(report.watermark_after <= Watermark(2_000));
        assert_eq!(report.watermark_after, Watermark(2_000));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].lookup_id, "l3");
        assert!(report.failures[0].retryable);

        // Next run sees records 3 to 5 again
        sink.accept_all();
        let second = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .batch_size(2)
            .run()
            .await
            .unwrap();
        assert_eq!(second.watermark_before, Watermark(2_000));
        assert_eq!(second.lookups, 3);
        assert_eq!(second.delivered, 1);
        assert_eq!(second.already_synced, 2);
        assert_eq!(second.watermark_after, Watermark(5_000));
        assert_eq!(sink.delivered().len(), 5);
    }

    #[tokio::test]
    async fn test_fatal_failure_settles_and_is_reported() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let mut stages = mocks.stages();
        stages.sense = Arc::new(ScriptedRuntime::<SenseTask>::new(|req| {
            if req.lemma == "dom" {
                Err(ProviderError::Credentials("revoked".to_string()))
            } else {
                Ok(SenseResponse {
                    definition: format!("meaning of {}", req.lemma),
                    original_language_definition: String::new(),
                    cloze_deletion_score: 8,
                    usage_level: None,
                })
            }
        }));
        let pipeline = test_pipeline(pool.clone(), stages);
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let source = MemorySource::new(five_lookups());
        let sink = MemorySink::new();

        let report = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .run()
            .await
            .unwrap();

        assert_eq!(report.delivered, 4);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.failures[0].retryable);
        assert_eq!(report.failures[0].expression, "dom");
        assert_eq!(report.watermark_after, Watermark(5_000));
    }

    #[tokio::test]
    async fn test_exhausted_retries_block_watermark() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let mut stages = mocks.stages();
        stages.sense = Arc::new(ScriptedRuntime::<SenseTask>::new(|req| {
            if req.lemma == "pies" {
                Err(ProviderError::Timeout)
            } else {
                Ok(SenseResponse {
                    definition: format!("meaning of {}", req.lemma),
                    original_language_definition: String::new(),
                    cloze_deletion_score: 2,
                    usage_level: None,
                })
            }
        }));
        let pipeline = test_pipeline(pool.clone(), stages);
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let source = MemorySource::new(five_lookups());
        let sink = MemorySink::new();

        let report = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .batch_size(1)
            .run()
            .await
            .unwrap();

        assert_eq!(report.retryable_failures(), 1);
        assert_eq!(report.watermark_after, Watermark(1_000));
        assert_eq!(tracker.read_watermark().await.unwrap(), Watermark(1_000));
    }

    #[tokio::test]
    async fn test_equal_timestamps_across_batches() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let pipeline = test_pipeline(pool.clone(), mocks.stages());
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let source = MemorySource::new(vec![
            lookup("a", "kot", "Kot śpi.", 1_000),
            lookup("b", "dom", "Dom stoi.", 1_000),
        ]);
        let sink = MemorySink::new();
        sink.reject_expression("dom");

        let report = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .batch_size(1)
            .run()
            .await
            .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.watermark_after, Watermark::ORIGIN);
    }

    #[tokio::test]
    async fn test_dry_run_counts_cards_but_writes_nothing() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let pipeline = test_pipeline(pool.clone(), mocks.stages());
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let source = MemorySource::new(five_lookups());
        let sink = MemorySink::new();

        let report = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .dry_run(true)
            .run()
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.lookups, 5);
        assert_eq!(report.delivered, 5);
        assert_eq!(report.watermark_after, Watermark::ORIGIN);
        assert!(sink.delivered().is_empty());
        assert_eq!(tracker.read_watermark().await.unwrap(), Watermark::ORIGIN);
    }

    #[tokio::test]
    async fn test_two_senses_of_zamek_end_to_end() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let pipeline = test_pipeline(pool.clone(), mocks.stages());
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let source = MemorySource::new(vec![
            lookup("l1", "Zamek", "Zamek na wzgórzu.", 1_000),
            lookup("l2", "zamek", "Zepsuł się zamek w kurtce.", 2_000),
            lookup("l3", "zamek", "Zamek w drzwiach nie działa.", 3_000),
        ]);
        let sink = MemorySink::new();

        let report = Importer::new(&source, &pipeline, &pruner, &sink, &tracker)
            .run()
            .await
            .unwrap();

        // l3 is the same "lock" sense as l2 and merges into it
        assert_eq!(report.delivered, 2);
        assert_eq!(report.merged, 1);
        let cards = sink.delivered();
        assert!(cards.iter().all(|c| c.expression == "zamek"));
        assert_ne!(cards[0].uid, cards[1].uid);
        assert_ne!(cards[0].definition, cards[1].definition);
        assert_eq!(report.watermark_after, Watermark(3_000));
    }

    #[tokio::test]
    async fn test_merge_into_synced_duplicate_settles_both() {
        let (pool, _dir) = temp_db().await;
        let mocks = MockStages::dictionary();
        let pipeline = test_pipeline(pool.clone(), mocks.stages());
        let pruner = Pruner::default();
        let tracker = ImportTracker::new(pool, "memory");
        let sink = MemorySink::new();

        let first = MemorySource::new(vec![lookup("l1", "zamek", "Zamek na wzgórzu.", 1_000)]);
        let report = Importer::new(&first, &pipeline, &pruner, &sink, &tracker)
            .run()
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);

        // Both new lookups mean "castle": l2 duplicates the synced card, l3 merges into l2
        let lookups = vec![
            lookup("l1", "zamek", "Zamek na wzgórzu.", 1_000),
            lookup("l2", "zamek", "Stary zamek na wzgórzu.", 2_000),
            lookup("l3", "zamek", "Widzę zamek na wzgórzu.", 3_000),
        ];
        let second = MemorySource::new(lookups.clone());
        let report = Importer::new(&second, &pipeline, &pruner, &sink, &tracker)
            .run()
            .await
            .unwrap();
        assert_eq!(report.lookups, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.merged, 1);
        assert_eq!(report.already_synced, 1);
        assert!(report.failures.is_empty());
        assert_eq!(report.watermark_after, Watermark(3_000));

        let third = MemorySource::new(lookups);
        let report = Importer::new(&third, &pipeline, &pruner, &sink, &tracker)
            .run()
            .await
            .unwrap();
        assert_eq!(report.lookups, 0);
        assert_eq!(sink.delivered().len(), 1);
    }
}
