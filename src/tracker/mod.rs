//! Incremental import state.
//!
//! One watermark per source, stored in the `import_state` table. Normal runs
//! can only move it forward; [`ImportTracker::rewind`] is the explicit way
//! back.

use sqlx::sqlite::SqlitePool;

use crate::model::Watermark;

/// Watermark store for one source.
#[derive(Debug, Clone)]
pub struct ImportTracker {
    pool: SqlitePool,
    source: String,
}

impl ImportTracker {
    pub fn new(pool: SqlitePool, source: impl Into<String>) -> Self {
        Self {
            pool,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current watermark, [`Watermark::ORIGIN`] if nothing was imported yet.
    pub async fn read_watermark(&self) -> Result<Watermark, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT watermark FROM import_state WHERE source = ?")
                .bind(&self.source)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(w,)| Watermark(w)).unwrap_or(Watermark::ORIGIN))
    }

    /// Move the watermark forward to `to`. Never moves it back.
    ///
    /// Returns the stored watermark.
    pub async fn advance(&self, to: Watermark) -> Result<Watermark, sqlx::Error> {
        let (stored,): (i64,) = sqlx::query_as(
            "INSERT INTO import_state (source, watermark, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(source) DO UPDATE SET
                 watermark = MAX(import_state.watermark, excluded.watermark),
                 updated_at = excluded.updated_at
             RETURNING watermark",
        )
        .bind(&self.source)
        .bind(to.millis())
        .bind(chrono::Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let stored = Watermark(stored);
        if stored > to {
            tracing::debug!(source = %self.source, requested = %to, stored = %stored, "Watermark already ahead");
        }
        Ok(stored)
    }

    /// Set the watermark to `to`, even if that moves it back.
    pub async fn rewind(&self, to: Watermark) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO import_state (source, watermark, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(source) DO UPDATE SET
                 watermark = excluded.watermark,
                 updated_at = excluded.updated_at",
        )
        .bind(&self.source)
        .bind(to.millis())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!(source = %self.source, watermark = %to, "Watermark rewound");
        Ok(())
    }
}

/// Highest timestamp the watermark may move to after a batch.
///
/// `records` holds (timestamp, settled) for every lookup of the batch. The
/// result is the largest settled timestamp strictly below the earliest
/// unsettled one, so no unsettled lookup is ever covered. Lookups sharing a
/// timestamp with an unsettled one are held back too.
pub fn settled_watermark(records: &[(i64, bool)]) -> Option<Watermark> {
    let first_unsettled = records
        .iter()
        .filter(|(_, settled)| !settled)
        .map(|(ts, _)| *ts)
        .min();

    records
        .iter()
        .filter(|(ts, settled)| *settled && first_unsettled.is_none_or(|limit| *ts < limit))
        .map(|(ts, _)| *ts)
        .max()
        .map(Watermark)
}
