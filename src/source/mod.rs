//! Lookup sources.
//!
//! A source yields [`RawLookup`]s newer than a watermark, ordered by
//! (timestamp, id). The import run relies on that order to settle the
//! watermark.

mod kindle;

pub use kindle::KindleVocabSource;

use futures::stream::BoxStream;
use std::path::PathBuf;

use crate::model::{RawLookup, Watermark};

/// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Vocabulary database not found: {0}")]
    NotFound(PathBuf),

    #[error("Vocabulary database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Where lookups come from.
pub trait LookupSource: Send + Sync {
    /// Identifies the source in the import state table.
    fn name(&self) -> &str;

    /// Lookups with a timestamp strictly after `watermark`, oldest first.
    fn lookups_since(&self, watermark: Watermark) -> BoxStream<'_, Result<RawLookup, SourceError>>;
}
