//! Card sinks: where finished cards go, and what they already hold.
//!
//! A sink answers two questions for the import run:
//! - which cards with a given dictionary form were synced before
//! - which of a batch of cards it accepted
//!
//! Rejections are per card. An `Err` from either method means the sink as a
//! whole is unavailable, which aborts the run.

mod tsv;

pub use tsv::TsvSink;

use async_trait::async_trait;

use crate::model::EnrichedCard;

/// A card already present in the sink, as far as pruning needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedCard {
    pub uid: String,
    pub expression: String,
    pub part_of_speech: String,
    pub definition: String,
}

impl From<&EnrichedCard> for SyncedCard {
    fn from(card: &EnrichedCard) -> Self {
        Self {
            uid: card.uid.clone(),
            expression: card.expression.clone(),
            part_of_speech: card.part_of_speech.clone(),
            definition: card.definition.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Accepted,
    Rejected(String),
}

/// Sink verdict for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub uid: String,
    pub status: DeliveryStatus,
}

impl DeliveryReport {
    pub fn accepted(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            status: DeliveryStatus::Accepted,
        }
    }

    pub fn rejected(uid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            status: DeliveryStatus::Rejected(reason.into()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == DeliveryStatus::Accepted
    }
}

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Destination for finished cards.
#[async_trait]
pub trait CardSink: Send + Sync {
    /// Human-readable name for logs and reports.
    fn name(&self) -> &str;

    /// Synced cards whose expression folds to one of `expressions`.
    async fn synced_cards(&self, expressions: &[String]) -> Result<Vec<SyncedCard>, SinkError>;

    /// Deliver cards. Returns one report per card, in input order.
    async fn deliver(&self, cards: &[EnrichedCard]) -> Result<Vec<DeliveryReport>, SinkError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================
