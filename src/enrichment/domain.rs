//! Internal domain types for the enrichment stages.
//!
//! These types are OUR types - they don't change when a provider's API changes.
//! Every runtime converts its wire format into these request/response pairs,
//! and these are what the cache stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::model::UnitType;

/// Identifies a pipeline stage. Part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    /// Lexical unit identification
    Candidate,
    /// Word sense disambiguation
    Sense,
    Translation,
    Collocation,
    /// Short source-language hint (gender, aspect pair, register)
    Hint,
}

impl TaskId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "lui",
            Self::Sense => "wsd",
            Self::Translation => "translation",
            Self::Collocation => "collocation",
            Self::Hint => "hint",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stage requests and responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRequest {
    pub word: String,
    pub sentence: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResponse {
    pub lemma: String,
    pub part_of_speech: String,
    #[serde(default)]
    pub aspect: String,
    #[serde(default)]
    pub surface_lexical_unit: String,
    #[serde(default)]
    pub unit_type: UnitType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenseRequest {
    pub word: String,
    pub lemma: String,
    pub part_of_speech: String,
    pub sentence: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenseResponse {
    pub definition: String,
    #[serde(default)]
    pub original_language_definition: String,
    #[serde(default)]
    pub cloze_deletion_score: u8,
    #[serde(default)]
    pub usage_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub sentence: String,
    pub word: String,
    /// Resolved sense, so the word is translated in the right meaning
    pub definition: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationRequest {
    pub lemma: String,
    pub part_of_speech: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationResponse {
    #[serde(default)]
    pub collocations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintRequest {
    pub lemma: String,
    pub part_of_speech: String,
    pub definition: String,
    pub source_language: String,
    pub target_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintResponse {
    #[serde(default)]
    pub hint: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors a runtime can return from a single invocation.
///
/// Each variant is either transient (worth retrying) or fatal for the record,
/// see [`ProviderError::is_transient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limited - retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Output that is not valid JSON, or was cut off
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),

    /// Valid JSON that does not match the stage's response type
    #[error("Response does not match {expected}: {actual}")]
    ContractViolation { expected: String, actual: String },
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Timeout
                | Self::Network(_)
                | Self::Unavailable { .. }
                | Self::Malformed(_)
        )
    }

    /// Server-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: String) -> Self {
        match status {
            401 | 403 => Self::Credentials(message),
            408 => Self::Timeout,
            429 => Self::RateLimited { retry_after },
            500..=599 => Self::Unavailable { status, message },
            _ => Self::Unsupported(format!("HTTP {}: {}", status, message)),
        }
    }

    pub fn contract(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ContractViolation {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Final outcome of a stage invocation after retries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// Not retried
    #[error("{0}")]
    Fatal(ProviderError),

    /// Transient failures until the attempt ceiling
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ProviderError },
}
