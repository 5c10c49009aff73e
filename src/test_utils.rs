//! Test utilities and fixtures for lexicard tests.
//!
//! This module provides a temporary state database, record factories, and
//! scripted stage runtimes so pipeline tests never touch the network.
//!
//! # Example
//!
//! ```ignore
//! use lexicard::test_utils::{temp_db, MockStages, test_pipeline};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let mocks = MockStages::dictionary();
//!     let pipeline = test_pipeline(pool, mocks.stages());
//!     // ... test logic
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::cache::StageCache;
use crate::enrichment::domain::{
    CandidateResponse, CollocationResponse, SenseResponse, TranslationResponse,
};
use crate::enrichment::retry::RetryPolicy;
use crate::enrichment::tasks::{CandidateTask, CollocationTask, SenseTask, TranslationTask};
use crate::enrichment::traits::mocks::ScriptedRuntime;
use crate::model::{CandidateUnit, EnrichedCard, RawLookup, SenseRecord, UnitType};
use crate::pipeline::{Pipeline, PipelineSettings, ProviderLimits, Stages};

/// Creates a temporary state database for testing.
///
/// The database lives in a temporary directory that is removed when the
/// returned `TempDir` is dropped. Migrations are run automatically.
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// A Polish lookup from a fixed test book.
pub fn lookup(id: &str, word: &str, sentence: &str, timestamp: i64) -> RawLookup {
    RawLookup {
        id: id.to_string(),
        word: word.to_string(),
        stem: None,
        sentence: sentence.to_string(),
        language: "pl".to_string(),
        book_title: "Pan Tadeusz".to_string(),
        location: timestamp.to_string(),
        timestamp,
    }
}

/// A finished card, built the same way the pipeline builds one.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let card = EnrichedCard {
///     source_book: "Lalka".to_string(),
///     ..mock_card("l1", "zamek", "castle", 1_000)
/// };
/// ```
pub fn mock_card(lookup_id: &str, expression: &str, definition: &str, timestamp: i64) -> EnrichedCard {
    let raw = lookup(lookup_id, expression, &format!("To jest {}.", expression), timestamp);
    let sense = SenseRecord {
        unit: CandidateUnit {
            surface: expression.to_string(),
            lemma: expression.to_string(),
            part_of_speech: "noun".to_string(),
            aspect: String::new(),
            unit_type: UnitType::Lemma,
        },
        definition: definition.to_string(),
        secondary_definition: String::new(),
        cloze_sentence: crate::model::cloze_markup(&raw.sentence, expression),
        cloze_score: 8,
        usage_level: Some(3),
    };
    EnrichedCard::assemble(&raw, sense, "This is it.".to_string(), Vec::new(), String::new())
}

/// Retry policy that does not slow tests down.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Scripted runtimes for the four required stages.
pub struct MockStages {
    pub candidate: Arc<ScriptedRuntime<CandidateTask>>,
    pub sense: Arc<ScriptedRuntime<SenseTask>>,
    pub translation: Arc<ScriptedRuntime<TranslationTask>>,
    pub collocation: Arc<ScriptedRuntime<CollocationTask>>,
}

impl MockStages {
    /// A tiny Polish dictionary.
    ///
    /// The lemma is the lowercased word. "zamek" means castle when the
    /// sentence mentions a hill and lock otherwise.
    pub fn dictionary() -> Self {
        Self {
            candidate: Arc::new(ScriptedRuntime::<CandidateTask>::new(|req| {
                Ok(CandidateResponse {
                    lemma: req.word.to_lowercase(),
                    part_of_speech: "noun".to_string(),
                    aspect: String::new(),
                    surface_lexical_unit: req.word.clone(),
                    unit_type: UnitType::Lemma,
                })
            })),
            sense: Arc::new(ScriptedRuntime::<SenseTask>::new(|req| {
                let definition = if req.sentence.contains("wzgórzu") {
                    "castle, fortress"
                } else {
                    "lock, zipper"
                };
                Ok(SenseResponse {
                    definition: definition.to_string(),
                    original_language_definition: String::new(),
                    cloze_deletion_score: 8,
                    usage_level: Some(4),
                })
            })),
            translation: Arc::new(ScriptedRuntime::<TranslationTask>::new(|req| {
                Ok(TranslationResponse {
                    translation: format!("EN: {}", req.sentence),
                })
            })),
            collocation: Arc::new(ScriptedRuntime::<CollocationTask>::new(|req| {
                Ok(CollocationResponse {
                    collocations: vec![format!("stary {}", req.lemma)],
                })
            })),
        }
    }

    /// Stage set sharing these runtimes (no hint stage).
    pub fn stages(&self) -> Stages {
        Stages {
            candidate: self.candidate.clone(),
            sense: self.sense.clone(),
            translation: self.translation.clone(),
            collocation: self.collocation.clone(),
            hint: None,
        }
    }

    /// Invocations across all stages.
    pub fn total_calls(&self) -> usize {
        self.candidate.calls()
            + self.sense.calls()
            + self.translation.calls()
            + self.collocation.calls()
    }
}

/// Pipeline over `pool` with fast retries.
pub fn test_pipeline(pool: SqlitePool, stages: Stages) -> Pipeline {
    Pipeline::new(
        stages,
        StageCache::new(pool),
        ProviderLimits::new(4, Default::default()),
        PipelineSettings {
            concurrency: 4,
            retry: fast_retry(),
            target_language: "en".to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let stats = StageCache::new(pool).stats().await.unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_mock_card_defaults() {
        let card = mock_card("l1", "zamek", "castle", 1_000);
        assert_eq!(card.lookup_id, "l1");
        assert_eq!(card.expression, "zamek");
        assert_eq!(card.timestamp, 1_000);
        assert_eq!(card.location, "loc_1000");
        assert!(card.cloze_enabled);
    }

    #[tokio::test]
    async fn test_dictionary_senses() {
        let mocks = MockStages::dictionary();
        let stages = mocks.stages();
        let request = crate::enrichment::domain::SenseRequest {
            word: "zamek".to_string(),
            lemma: "zamek".to_string(),
            part_of_speech: "noun".to_string(),
            sentence: "Zamek na wzgórzu.".to_string(),
            source_language: "pl".to_string(),
            target_language: "en".to_string(),
        };
        let sense = stages.sense.invoke(&request).await.unwrap();
        assert_eq!(sense.definition, "castle, fortress");
        assert_eq!(mocks.total_calls(), 1);
    }
}
