//! State database: the stage cache and the import watermark.
//!
//! Uses SQLx with SQLite. Both tables must survive restarts, since the cache
//! holds work that was paid for and the watermark decides what gets
//! imported next. Schema lives in `migrations/`.
//!
//! # Example
//!
//! ```ignore
//! use lexicard::db::{db_url, init_db};
//!
//! let pool = init_db(&db_url(Some(Path::new("state.db")))).await?;
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "lexicard_state.db";

/// Default state database location inside the OS data directory.
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("lexicard"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_NAME)
}

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist. WAL mode and a busy
/// timeout let concurrent stage workers write cache rows without
/// "database is locked" failures.
///
/// # Errors
///
/// Returns an error if:
/// - The URL is invalid
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db");
        let url = db_url(Some(&db_path));

        let pool = init_db(&url).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"stage_cache"));
        assert!(names.contains(&"import_state"));
    }

    #[tokio::test]
    async fn test_init_db_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let url = db_url(Some(&dir.path().join("state.db")));

        let first = init_db(&url).await.unwrap();
        first.close().await;
        assert!(init_db(&url).await.is_ok());
    }

    #[test]
    fn test_db_url() {
        assert_eq!(db_url(Some(Path::new("/tmp/x.db"))), "sqlite:/tmp/x.db");
        assert_eq!(db_url(None), "sqlite:lexicard_state.db");
    }
}
