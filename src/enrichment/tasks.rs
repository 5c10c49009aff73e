//! The five pipeline stages as [`Task`] implementations.
//!
//! `accept` is the validation boundary: whatever a runtime returns must pass
//! it before the pipeline caches or uses it.

use super::domain::{
    CandidateRequest, CandidateResponse, CollocationRequest, CollocationResponse, HintRequest,
    HintResponse, ProviderError, SenseRequest, SenseResponse, TaskId, TranslationRequest,
    TranslationResponse,
};
use super::traits::Task;

/// Upper bound on collocations kept per card.
pub const MAX_COLLOCATIONS: usize = 8;

/// Candidate extraction (lexical unit identification).
pub struct CandidateTask;

impl Task for CandidateTask {
    const ID: TaskId = TaskId::Candidate;
    type Request = CandidateRequest;
    type Response = CandidateResponse;

    fn accept(mut response: CandidateResponse) -> Result<CandidateResponse, ProviderError> {
        response.lemma = response.lemma.trim().to_string();
        response.part_of_speech = response.part_of_speech.trim().to_lowercase();
        response.aspect = response.aspect.trim().to_lowercase();
        response.surface_lexical_unit = response.surface_lexical_unit.trim().to_string();

        if response.lemma.is_empty() {
            return Err(ProviderError::contract("lemma", "empty"));
        }
        if response.part_of_speech.is_empty() {
            return Err(ProviderError::contract("part_of_speech", "empty"));
        }
        Ok(response)
    }
}

/// Sense disambiguation.
pub struct SenseTask;

impl Task for SenseTask {
    const ID: TaskId = TaskId::Sense;
    type Request = SenseRequest;
    type Response = SenseResponse;

    fn accept(mut response: SenseResponse) -> Result<SenseResponse, ProviderError> {
        response.definition = response.definition.trim().to_string();
        response.original_language_definition =
            response.original_language_definition.trim().to_string();

        if response.definition.is_empty() {
            return Err(ProviderError::contract("definition", "empty"));
        }
        if response.cloze_deletion_score > 10 {
            return Err(ProviderError::contract(
                "cloze_deletion_score in 0..=10",
                response.cloze_deletion_score.to_string(),
            ));
        }
        if let Some(level) = response.usage_level
            && !(1..=5).contains(&level)
        {
            return Err(ProviderError::contract("usage_level in 1..=5", level.to_string()));
        }
        Ok(response)
    }
}

/// Context sentence translation.
pub struct TranslationTask;

impl Task for TranslationTask {
    const ID: TaskId = TaskId::Translation;
    type Request = TranslationRequest;
    type Response = TranslationResponse;

    fn accept(mut response: TranslationResponse) -> Result<TranslationResponse, ProviderError> {
        response.translation = response.translation.trim().to_string();
        if response.translation.is_empty() {
            return Err(ProviderError::contract("translation", "empty"));
        }
        Ok(response)
    }
}

/// Common collocations of the dictionary form.
pub struct CollocationTask;

impl Task for CollocationTask {
    const ID: TaskId = TaskId::Collocation;
    type Request = CollocationRequest;
    type Response = CollocationResponse;

    fn accept(response: CollocationResponse) -> Result<CollocationResponse, ProviderError> {
        let mut collocations: Vec<String> = Vec::with_capacity(response.collocations.len());
        for item in response.collocations {
            let item = item.trim().to_string();
            if !item.is_empty() && !collocations.contains(&item) {
                collocations.push(item);
            }
        }
        collocations.truncate(MAX_COLLOCATIONS);
        Ok(CollocationResponse { collocations })
    }
}

/// Source-language hint (grammatical notes for the learner).
pub struct HintTask;

impl Task for HintTask {
    const ID: TaskId = TaskId::Hint;
    type Request = HintRequest;
    type Response = HintResponse;

    fn accept(response: HintResponse) -> Result<HintResponse, ProviderError> {
        Ok(HintResponse {
            hint: response.hint.trim().to_string(),
        })
    }
}
