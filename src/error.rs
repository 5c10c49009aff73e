//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror` ([`SourceError`],
//! [`SinkError`], [`ConfigError`]); this module aggregates them for the
//! import run. CLI/main uses `anyhow` on top. Cache failures never reach
//! this level: the pipeline treats them as misses.
//!
//! Per-lookup stage failures are not errors at this level. They are
//! collected in the run report; an [`Error`] means the run itself stopped.
//!
//! [`SourceError`]: crate::source::SourceError
//! [`SinkError`]: crate::sink::SinkError
//! [`ConfigError`]: crate::config::ConfigError

use std::time::Duration;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// State database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Lookup source unreadable
    #[error("Source error: {0}")]
    Source(#[from] crate::source::SourceError),

    /// Card sink unavailable
    #[error("Sink error: {0}")]
    Sink(#[from] crate::sink::SinkError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Interrupted by the user
    #[error("Cancelled")]
    Cancelled,

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, crate::sink::SinkError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Sink(e).context(ctx))
    }
}
