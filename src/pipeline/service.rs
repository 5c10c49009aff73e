//! Enrichment pipeline - turns lookups into cards, one stage at a time
//!
//! For every lookup:
//! 1. Candidate extraction (lemma, part of speech, unit type)
//! 2. Sense disambiguation (definition for this context, cloze score)
//! 3. Translation of the context sentence in that sense
//! 4. Collocations of the dictionary form
//! 5. Optionally, a short source-language hint
//!
//! Every stage call goes through the cache first. Lookups run concurrently
//! up to a limit; calls to one provider are additionally bounded by that
//! provider's semaphore.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::cache::{CacheKey, StageCache};
use crate::enrichment::domain::{
    CandidateRequest, CandidateResponse, CollocationRequest, HintRequest, InvocationError,
    ProviderError, SenseRequest, SenseResponse, TaskId, TranslationRequest,
};
use crate::enrichment::retry::RetryPolicy;
use crate::enrichment::tasks::{
    CandidateTask, CollocationTask, HintTask, SenseTask, TranslationTask,
};
use crate::enrichment::traits::{Task, TaskRuntime};
use crate::model::{self, CandidateUnit, EnrichedCard, RawLookup, SenseRecord};

use super::limits::ProviderLimits;

/// The runtime configured for each stage
pub struct Stages {
    pub candidate: Arc<dyn TaskRuntime<CandidateTask>>,
    pub sense: Arc<dyn TaskRuntime<SenseTask>>,
    pub translation: Arc<dyn TaskRuntime<TranslationTask>>,
    pub collocation: Arc<dyn TaskRuntime<CollocationTask>>,
    pub hint: Option<Arc<dyn TaskRuntime<HintTask>>>,
}

/// Execution settings for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Lookups processed concurrently
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Learner's language code
    pub target_language: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
            target_language: "en".to_string(),
        }
    }
}

/// A lookup that could not be turned into a card
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub lookup_id: String,
    pub timestamp: i64,
    pub word: String,
    pub stage: TaskId,
    pub error: InvocationError,
}

impl RecordFailure {
    fn new(lookup: &RawLookup, stage: TaskId, error: InvocationError) -> Self {
        Self {
            lookup_id: lookup.id.clone(),
            timestamp: lookup.timestamp,
            word: lookup.word.clone(),
            stage,
            error,
        }
    }

    /// Whether a later run may succeed (transient failures that ran out of attempts).
    pub fn is_retryable(&self) -> bool {
        matches!(self.error, InvocationError::Exhausted { .. })
    }
}

/// Result of processing one batch: cards and failures, both in input order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub cards: Vec<EnrichedCard>,
    pub failures: Vec<RecordFailure>,
}

/// Runs the stage chain for lookups
pub struct Pipeline {
    stages: Stages,
    cache: StageCache,
    limits: ProviderLimits,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        stages: Stages,
        cache: StageCache,
        limits: ProviderLimits,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            stages,
            cache,
            limits,
            settings,
        }
    }

    /// Process a batch. Returns once every lookup has a card or a failure.
    pub async fn process_batch(&self, lookups: &[RawLookup]) -> BatchOutcome {
        let mut results: Vec<(usize, Result<EnrichedCard, RecordFailure>)> =
            stream::iter(lookups.iter().enumerate())
                .map(|(index, lookup)| async move { (index, self.process_lookup(lookup).await) })
                .buffer_unordered(self.settings.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut outcome = BatchOutcome::default();
        for (_, result) in results {
            match result {
                Ok(card) => outcome.cards.push(card),
                Err(failure) => {
                    tracing::warn!(
                        lookup = %failure.lookup_id,
                        word = %failure.word,
                        stage = %failure.stage,
                        "Lookup failed: {}",
                        failure.error
                    );
                    outcome.failures.push(failure);
                }
            }
        }
        outcome
    }

    /// Run every stage for one lookup.
    pub async fn process_lookup(&self, lookup: &RawLookup) -> Result<EnrichedCard, RecordFailure> {
        let fail = |stage: TaskId| {
            move |error: InvocationError| RecordFailure::new(lookup, stage, error)
        };

        let candidate = self
            .run_stage(
                self.stages.candidate.as_ref(),
                &CandidateRequest {
                    word: lookup.word.clone(),
                    sentence: lookup.sentence.clone(),
                    language: lookup.language.clone(),
                },
            )
            .await
            .map_err(fail(TaskId::Candidate))?;
        let unit = candidate_unit(candidate, lookup);

        let sense = self
            .run_stage(
                self.stages.sense.as_ref(),
                &SenseRequest {
                    word: lookup.word.clone(),
                    lemma: unit.lemma.clone(),
                    part_of_speech: unit.part_of_speech.clone(),
                    sentence: lookup.sentence.clone(),
                    source_language: lookup.language.clone(),
                    target_language: self.settings.target_language.clone(),
                },
            )
            .await
            .map_err(fail(TaskId::Sense))?;
        let sense = sense_record(unit, sense, &lookup.sentence);

        let translation = self
            .run_stage(
                self.stages.translation.as_ref(),
                &TranslationRequest {
                    sentence: lookup.sentence.clone(),
                    word: sense.unit.surface.clone(),
                    definition: sense.definition.clone(),
                    source_language: lookup.language.clone(),
                    target_language: self.settings.target_language.clone(),
                },
            )
            .await
            .map_err(fail(TaskId::Translation))?;

        let collocations = self
            .run_stage(
                self.stages.collocation.as_ref(),
                &CollocationRequest {
                    lemma: sense.unit.lemma.clone(),
                    part_of_speech: sense.unit.part_of_speech.clone(),
                    language: lookup.language.clone(),
                },
            )
            .await
            .map_err(fail(TaskId::Collocation))?;

        let hint = match &self.stages.hint {
            Some(runtime) => {
                self.run_stage(
                    runtime.as_ref(),
                    &HintRequest {
                        lemma: sense.unit.lemma.clone(),
                        part_of_speech: sense.unit.part_of_speech.clone(),
                        definition: sense.definition.clone(),
                        source_language: lookup.language.clone(),
                        target_language: self.settings.target_language.clone(),
                    },
                )
                .await
                .map_err(fail(TaskId::Hint))?
                .hint
            }
            None => String::new(),
        };

        Ok(EnrichedCard::assemble(
            lookup,
            sense,
            translation.translation,
            collocations.collocations,
            hint,
        ))
    }

    /// Cache lookup, then a rate-limited, retried invocation, then cache write.
    async fn run_stage<T: Task>(
        &self,
        runtime: &dyn TaskRuntime<T>,
        request: &T::Request,
    ) -> Result<T::Response, InvocationError> {
        let key = CacheKey::new(T::ID, request, &runtime.provider_id(), runtime.prompt_version())
            .map_err(|e| InvocationError::Fatal(ProviderError::Unsupported(e.to_string())))?;

        match self.cache.get::<T::Response>(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(task = %T::ID, "Cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(task = %T::ID, "Cache read failed, treating as miss: {}", e),
        }

        let semaphore = self.limits.semaphore(runtime.provider());
        let semaphore = &semaphore;
        let response = self
            .settings
            .retry
            .run(T::ID, move || async move {
                // Permit is held for the call only, not during backoff
                let _permit = semaphore.acquire().await.map_err(|_| {
                    ProviderError::Network("provider limiter closed".to_string())
                })?;
                runtime.invoke(request).await
            })
            .await?;

        let response = T::accept(response).map_err(InvocationError::Fatal)?;

        if let Err(e) = self.cache.put(&key, &response).await {
            tracing::warn!(task = %T::ID, "Failed to cache result: {}", e);
        }
        Ok(response)
    }
}

/// Prefer the model's surface form, but only if it really occurs in the sentence.
fn candidate_unit(response: CandidateResponse, lookup: &RawLookup) -> CandidateUnit {
    let surface = if !response.surface_lexical_unit.is_empty()
        && lookup.sentence.contains(&response.surface_lexical_unit)
    {
        response.surface_lexical_unit
    } else {
        lookup.word.clone()
    };

    CandidateUnit {
        surface,
        lemma: response.lemma,
        part_of_speech: response.part_of_speech,
        aspect: response.aspect,
        unit_type: response.unit_type,
    }
}

fn sense_record(unit: CandidateUnit, response: SenseResponse, sentence: &str) -> SenseRecord {
    let cloze_sentence = model::cloze_markup(sentence, &unit.surface);
    SenseRecord {
        unit,
        definition: response.definition,
        secondary_definition: response.original_language_definition,
        cloze_sentence,
        cloze_score: response.cloze_deletion_score,
        usage_level: response.usage_level,
    }
}
