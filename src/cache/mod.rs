//! Content-addressed cache of stage results.
//!
//! A [`CacheKey`] is (task, input hash, provider id, prompt version). The
//! input hash is SHA-256 over the canonical JSON of the stage request: object
//! keys sorted, strings NFC-normalized with whitespace collapsed. Changing
//! the prompt template changes the version component, so a new template
//! never sees old answers.
//!
//! Rows are write-if-absent. Two workers finishing the same request at the
//! same time both `put`; the second insert is a no-op. An unreadable payload
//! is reported as a miss and removed so the key can be filled again.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;

use crate::enrichment::domain::TaskId;
use crate::text;

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Identity of one stage result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub task: TaskId,
    pub input_hash: String,
    pub provider: String,
    pub prompt_version: String,
}

impl CacheKey {
    pub fn new<R: Serialize>(
        task: TaskId,
        request: &R,
        provider: &str,
        prompt_version: &str,
    ) -> Result<Self, serde_json::Error> {
        let canonical = canonical_json(request)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());

        Ok(Self {
            task,
            input_hash: format!("{:x}", hasher.finalize()),
            provider: provider.to_string(),
            prompt_version: prompt_version.to_string(),
        })
    }
}

/// Serialize a request into its canonical JSON text.
pub fn canonical_json<R: Serialize>(request: &R) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(request)?;
    serde_json::to_string(&canonicalize(value))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(text::canonical_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        other => other,
    }
}

/// SQLite-backed stage cache.
#[derive(Debug, Clone)]
pub struct StageCache {
    pool: SqlitePool,
}

impl StageCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a cached result. Unreadable payloads are misses.
    pub async fn get<V: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<V>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM stage_cache
             WHERE task = ? AND input_hash = ? AND provider = ? AND prompt_version = ?",
        )
        .bind(key.task.as_str())
        .bind(&key.input_hash)
        .bind(&key.provider)
        .bind(&key.prompt_version)
        .fetch_optional(&self.pool)
        .await?;

        let Some((payload,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    task = %key.task,
                    input_hash = %key.input_hash,
                    "Unreadable cache entry, treating as miss: {}",
                    e
                );
                self.remove(key).await?;
                Ok(None)
            }
        }
    }

    /// Store a result unless the key already has one.
    ///
    /// Returns `true` if this call inserted the row.
    pub async fn put<V: Serialize>(&self, key: &CacheKey, value: &V) -> Result<bool, CacheError> {
        let payload = serde_json::to_string(value)?;
        let result = sqlx::query(
            "INSERT INTO stage_cache (task, input_hash, provider, prompt_version, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(task, input_hash, provider, prompt_version) DO NOTHING",
        )
        .bind(key.task.as_str())
        .bind(&key.input_hash)
        .bind(&key.provider)
        .bind(&key.prompt_version)
        .bind(&payload)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Number of cached results per task.
    pub async fn stats(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as("SELECT task, COUNT(*) FROM stage_cache GROUP BY task ORDER BY task")
            .fetch_all(&self.pool)
            .await
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), sqlx::Error> {
        sqlx::query(
            "DELETE FROM stage_cache
             WHERE task = ? AND input_hash = ? AND provider = ? AND prompt_version = ?",
        )
        .bind(key.task.as_str())
        .bind(&key.input_hash)
        .bind(&key.provider)
        .bind(&key.prompt_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::domain::{SenseRequest, SenseResponse};
    use crate::test_utils::temp_db;
    use proptest::prelude::*;

    fn request(sentence: &str) -> SenseRequest {
        SenseRequest {
            word: "zamku".to_string(),
            lemma: "zamek".to_string(),
            part_of_speech: "noun".to_string(),
            sentence: sentence.to_string(),
            source_language: "pl".to_string(),
            target_language: "en".to_string(),
        }
    }

    fn response(definition: &str) -> SenseResponse {
        SenseResponse {
            definition: definition.to_string(),
            original_language_definition: String::new(),
            cloze_deletion_score: 5,
            usage_level: Some(3),
        }
    }

    fn key(sentence: &str, version: &str) -> CacheKey {
        CacheKey::new(TaskId::Sense, &request(sentence), "openai:gpt-5-mini", version).unwrap()
    }

    #[test]
    fn test_canonical_json_sorts_and_normalizes() {
        let a = serde_json::json!({"b": " x  y ", "a": ["wzgo\u{0301}rze"]});
        let b = serde_json::json!({"a": ["wzgórze"], "b": "x y"});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(canonical_json(&b).unwrap(), r#"{"a":["wzgórze"],"b":"x y"}"#);
    }

    #[test]
    fn test_key_ignores_incidental_whitespace() {
        assert_eq!(
            key("W zamku  było zimno.", "v1"),
            key(" W zamku było zimno.\n", "v1")
        );
        assert_ne!(key("W zamku było zimno.", "v1"), key("W zamku było ciepło.", "v1"));
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (pool, _dir) = temp_db().await;
        let cache = StageCache::new(pool);
        let key = key("W zamku było zimno.", "v1");

        assert!(cache.get::<SenseResponse>(&key).await.unwrap().is_none());
        assert!(cache.put(&key, &response("castle")).await.unwrap());

        for _ in 0..3 {
            let hit: SenseResponse = cache.get(&key).await.unwrap().unwrap();
            assert_eq!(hit, response("castle"));
        }
    }

    #[tokio::test]
    async fn test_put_is_write_if_absent() {
        let (pool, _dir) = temp_db().await;
        let cache = StageCache::new(pool);
        let key = key("W zamku było zimno.", "v1");

        assert!(cache.put(&key, &response("castle")).await.unwrap());
        assert!(!cache.put(&key, &response("castle")).await.unwrap());
        assert!(!cache.put(&key, &response("lock")).await.unwrap());

        let hit: SenseResponse = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.definition, "castle");
    }

    #[tokio::test]
    async fn test_new_prompt_version_is_a_miss() {
        let (pool, _dir) = temp_db().await;
        let cache = StageCache::new(pool);

        cache
            .put(&key("W zamku było zimno.", "v1"), &response("castle"))
            .await
            .unwrap();
        let miss: Option<SenseResponse> =
            cache.get(&key("W zamku było zimno.", "v2")).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss_and_can_be_refilled() {
        let (pool, _dir) = temp_db().await;
        let cache = StageCache::new(pool.clone());
        let key = key("W zamku było zimno.", "v1");

        sqlx::query(
            "INSERT INTO stage_cache (task, input_hash, provider, prompt_version, payload, created_at)
             VALUES (?, ?, ?, ?, '{\"definit', '')",
        )
        .bind(key.task.as_str())
        .bind(&key.input_hash)
        .bind(&key.provider)
        .bind(&key.prompt_version)
        .execute(&pool)
        .await
        .unwrap();

        assert!(cache.get::<SenseResponse>(&key).await.unwrap().is_none());
        assert!(cache.put(&key, &response("castle")).await.unwrap());
        let hit: SenseResponse = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.definition, "castle");
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_same_value() {
        let (pool, _dir) = temp_db().await;
        let cache = StageCache::new(pool);
        let key = key("W zamku było zimno.", "v1");
        let value = response("castle");

        let results =
            futures::future::join_all((0..8).map(|_| cache.put(&key, &value))).await;
        let inserted = results.into_iter().map(|r| r.unwrap()).filter(|i| *i).count();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_stats_counts_per_task() {
        let (pool, _dir) = temp_db().await;
        let cache = StageCache::new(pool);
        cache.put(&key("a", "v1"), &response("x")).await.unwrap();
        cache.put(&key("b", "v1"), &response("y")).await.unwrap();

        assert_eq!(cache.stats().await.unwrap(), vec![("wsd".to_string(), 2)]);
    }

    proptest! {
        #[test]
        fn prop_key_is_stable_under_whitespace_padding(
            sentence in "[a-zA-Z ]{1,40}",
            pad in " {0,3}",
        ) {
            let padded = format!("{pad}{sentence}{pad}");
            prop_assert_eq!(key(&sentence, "v1"), key(&padded, "v1"));
        }
    }
}
