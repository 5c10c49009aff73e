//! Kindle Vocabulary Builder reader.
//!
//! The device keeps lookups in `vocab.db`:
//! - `WORDS` (id, word, stem, lang)
//! - `LOOKUPS` (id, word_key, book_key, pos, usage, timestamp)
//! - `BOOK_INFO` (id, title)
//!
//! `LOOKUPS.pos` is the reading position, not a part of speech. Timestamps
//! are milliseconds since the Unix epoch. Words the device never stemmed
//! (`WORDS.stem IS NULL`) are skipped. The file is opened read-only.

use futures::stream::{BoxStream, StreamExt};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use super::{LookupSource, SourceError};
use crate::model::{RawLookup, Watermark};

const LOOKUPS_SINCE: &str = "
    SELECT LOOKUPS.id AS id,
           COALESCE(WORDS.word, '') AS word,
           WORDS.stem AS stem,
           COALESCE(LOOKUPS.usage, '') AS sentence,
           COALESCE(WORDS.lang, '') AS language,
           COALESCE(BOOK_INFO.title, '') AS book_title,
           COALESCE(LOOKUPS.pos, '') AS location,
           LOOKUPS.timestamp AS timestamp
    FROM LOOKUPS
    JOIN WORDS ON LOOKUPS.word_key = WORDS.id
    LEFT JOIN BOOK_INFO ON LOOKUPS.book_key = BOOK_INFO.id
    WHERE LOOKUPS.timestamp > ? AND WORDS.stem IS NOT NULL
    ORDER BY LOOKUPS.timestamp, LOOKUPS.id";

#[derive(Debug, FromRow)]
struct LookupRow {
    id: String,
    word: String,
    stem: Option<String>,
    sentence: String,
    language: String,
    book_title: String,
    location: String,
    timestamp: i64,
}

impl From<LookupRow> for RawLookup {
    fn from(row: LookupRow) -> Self {
        Self {
            id: row.id,
            word: row.word.trim().to_string(),
            stem: row.stem.filter(|s| !s.trim().is_empty()),
            sentence: row.sentence.trim().to_string(),
            language: row.language.trim().to_lowercase(),
            book_title: row.book_title.trim().to_string(),
            location: row.location,
            timestamp: row.timestamp,
        }
    }
}

/// Read-only view of a Kindle `vocab.db`.
#[derive(Debug, Clone)]
pub struct KindleVocabSource {
    path: PathBuf,
    pool: SqlitePool,
}

impl KindleVocabSource {
    /// Source name in the import state table.
    pub const NAME: &'static str = "kindle";

    /// Open the database at `path`. Fails if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(SourceError::NotFound(path));
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { path, pool })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (newer than `watermark`, total) lookup counts.
    pub async fn count_since(&self, watermark: Watermark) -> Result<(i64, i64), SourceError> {
        let (pending,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM LOOKUPS
             JOIN WORDS ON LOOKUPS.word_key = WORDS.id
             WHERE LOOKUPS.timestamp > ? AND WORDS.stem IS NOT NULL",
        )
        .bind(watermark.millis())
        .fetch_one(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM LOOKUPS
             JOIN WORDS ON LOOKUPS.word_key = WORDS.id
             WHERE WORDS.stem IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((pending, total))
    }
}

impl LookupSource for KindleVocabSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn lookups_since(&self, watermark: Watermark) -> BoxStream<'_, Result<RawLookup, SourceError>> {
        sqlx::query_as::<_, LookupRow>(LOOKUPS_SINCE)
            .bind(watermark.millis())
            .fetch(&self.pool)
            .map(|row| row.map(RawLookup::from).map_err(SourceError::from))
            .boxed()
    }
}
