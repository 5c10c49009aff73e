//! Deduplication of new cards against each other and against synced cards.
//!
//! Cards are grouped by folded dictionary form and part of speech. Inside a
//! group, definitions are compared pairwise with [`token_set_ratio`]; pairs
//! at or above the threshold end up in one component and the component's
//! earliest card survives. The outcome does not depend on input order.

mod similarity;

pub use similarity::token_set_ratio;

use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::model::EnrichedCard;
use crate::sink::SyncedCard;
use crate::text;

/// Default minimum similarity for two definitions to count as one sense.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// What happened to one new card.
#[derive(Debug, Clone, PartialEq)]
pub enum PruneDecision {
    /// Deliver it
    Keep,
    /// Deliver it; other senses of the same form exist
    KeepDistinctSense { siblings: Vec<String> },
    /// Folded into an earlier card of this batch
    MergedInto { survivor: String, similarity: f64 },
    /// Same uid is already in the sink
    AlreadySynced,
    /// Same sense already in the sink under another uid
    DuplicateOfSynced { existing: String, similarity: f64 },
}

impl PruneDecision {
    /// Whether the card itself goes to the sink.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Keep | Self::KeepDistinctSense { .. })
    }
}

/// Decision for one card, identified by its lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CardDecision {
    pub lookup_id: String,
    pub uid: String,
    pub decision: PruneDecision,
}

#[derive(Debug, Default)]
pub struct PruneOutcome {
    /// Cards to deliver, ordered by (timestamp, lookup id, uid)
    pub survivors: Vec<EnrichedCard>,
    /// One entry per input card, ordered by (lookup id, uid)
    pub decisions: Vec<CardDecision>,
}

impl PruneOutcome {
    pub fn merged(&self) -> usize {
        self.count(|d| matches!(d, PruneDecision::MergedInto { .. }))
    }

    /// Cards dropped because the sink already has them.
    pub fn already_synced(&self) -> usize {
        self.count(|d| {
            matches!(
                d,
                PruneDecision::AlreadySynced | PruneDecision::DuplicateOfSynced { .. }
            )
        })
    }

    fn count(&self, pred: impl Fn(&PruneDecision) -> bool) -> usize {
        self.decisions.iter().filter(|d| pred(&d.decision)).count()
    }
}

type GroupKey = (String, String);

fn group_key(expression: &str, part_of_speech: &str) -> GroupKey {
    (text::fold_key(expression), text::fold_key(part_of_speech))
}

fn card_order(a: &EnrichedCard, b: &EnrichedCard) -> Ordering {
    (a.timestamp, &a.lookup_id, &a.uid).cmp(&(b.timestamp, &b.lookup_id, &b.uid))
}

/// Pruning engine
#[derive(Debug, Clone)]
pub struct Pruner {
    threshold: f64,
}

impl Default for Pruner {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Pruner {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide which of `cards` to deliver, given what the sink already holds.
    pub fn prune(&self, cards: Vec<EnrichedCard>, synced: &[SyncedCard]) -> PruneOutcome {
        let synced_uids: HashSet<&str> = synced.iter().map(|s| s.uid.as_str()).collect();
        let mut synced_groups: HashMap<GroupKey, Vec<&SyncedCard>> = HashMap::new();
        for card in synced {
            synced_groups
                .entry(group_key(&card.expression, &card.part_of_speech))
                .or_default()
                .push(card);
        }

        let mut decisions = Vec::with_capacity(cards.len());
        let mut groups: BTreeMap<GroupKey, Vec<EnrichedCard>> = BTreeMap::new();
        for card in cards {
            if synced_uids.contains(card.uid.as_str()) {
                decisions.push(CardDecision {
                    lookup_id: card.lookup_id,
                    uid: card.uid,
                    decision: PruneDecision::AlreadySynced,
                });
                continue;
            }
            groups
                .entry(group_key(&card.expression, &card.part_of_speech))
                .or_default()
                .push(card);
        }

        let groups: Vec<(GroupKey, Vec<EnrichedCard>)> = groups.into_iter().collect();
        let results: Vec<(Vec<EnrichedCard>, Vec<CardDecision>)> = groups
            .into_par_iter()
            .map(|(key, group)| {
                let synced = synced_groups.get(&key).map(Vec::as_slice).unwrap_or(&[]);
                self.prune_group(group, synced)
            })
            .collect();

        let mut survivors = Vec::new();
        for (kept, group_decisions) in results {
            survivors.extend(kept);
            decisions.extend(group_decisions);
        }
        survivors.sort_by(card_order);
        decisions.sort_by(|a, b| (&a.lookup_id, &a.uid).cmp(&(&b.lookup_id, &b.uid)));

        PruneOutcome {
            survivors,
            decisions,
        }
    }

    fn prune_group(
        &self,
        mut group: Vec<EnrichedCard>,
        synced: &[&SyncedCard],
    ) -> (Vec<EnrichedCard>, Vec<CardDecision>) {
        group.sort_by(card_order);

        let mut components = UnionFind::new(group.len());
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                if token_set_ratio(&group[i].definition, &group[j].definition) >= self.threshold {
                    components.union(i, j);
                }
            }
        }

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for index in 0..group.len() {
            members.entry(components.find(index)).or_default().push(index);
        }

        let mut decisions = Vec::with_capacity(group.len());
        let mut survivors = Vec::new();
        for (&root, indices) in &members {
            let mut survivor = group[root].clone();
            for &index in indices.iter().filter(|&&i| i != root) {
                let member = &group[index];
                survivor.merge_tags(member.tags.iter());
                decisions.push(CardDecision {
                    lookup_id: member.lookup_id.clone(),
                    uid: member.uid.clone(),
                    decision: PruneDecision::MergedInto {
                        survivor: survivor.uid.clone(),
                        similarity: token_set_ratio(&member.definition, &survivor.definition),
                    },
                });
            }
            survivors.push(survivor);
        }

        // Other senses of this form: every component root plus synced history
        let all_senses: BTreeSet<String> = survivors
            .iter()
            .map(|s| s.uid.clone())
            .chain(synced.iter().map(|s| s.uid.clone()))
            .collect();

        let mut kept = Vec::new();
        for survivor in survivors {
            let decision = match self.best_synced_match(&survivor, synced) {
                Some((existing, similarity)) => PruneDecision::DuplicateOfSynced {
                    existing: existing.to_string(),
                    similarity,
                },
                None => {
                    let siblings: Vec<String> = all_senses
                        .iter()
                        .filter(|uid| **uid != survivor.uid)
                        .cloned()
                        .collect();
                    if siblings.is_empty() {
                        PruneDecision::Keep
                    } else {
                        PruneDecision::KeepDistinctSense { siblings }
                    }
                }
            };

            decisions.push(CardDecision {
                lookup_id: survivor.lookup_id.clone(),
                uid: survivor.uid.clone(),
                decision: decision.clone(),
            });
            if decision.is_delivered() {
                kept.push(survivor);
            }
        }

        (kept, decisions)
    }

    /// Most similar synced card at or above the threshold (ties go to the smaller uid).
    fn best_synced_match<'a>(
        &self,
        card: &EnrichedCard,
        synced: &[&'a SyncedCard],
    ) -> Option<(&'a str, f64)> {
        synced
            .iter()
            .map(|s| (s.uid.as_str(), token_set_ratio(&card.definition, &s.definition)))
            .filter(|(_, similarity)| *similarity >= self.threshold)
            .min_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)))
    }
}

/// Disjoint sets over indices; the smaller index is always the root.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        match ra.cmp(&rb) {
            Ordering::Less => self.parent[rb] = ra,
            Ordering::Greater => self.parent[ra] = rb,
            Ordering::Equal => {}
        }
    }
}
