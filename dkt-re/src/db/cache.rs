//! Generic response cache
//!
//! Key/value rows with a per-entry TTL. `put` replaces any previous entry
//! for the key, so there is at most one live entry per key. Expiry is lazy:
//! `get` treats an entry older than its TTL as absent without deleting it,
//! and `purge_expired` removes such rows on demand.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dkt_common::Clock;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;

/// Key/value store with a validity window
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value for `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Insert or replace `key`, resetting its creation time
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<u64, CacheError>;
}

/// Derive a cache key from a namespace and request parts
///
/// Parts are length-prefixed before hashing so `["ab", "c"]` and
/// `["a", "bc"]` map to different keys.
pub fn cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    for part in parts {
        hasher.update(b"|");
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// SQLite-backed cache using the `response_cache` table
pub struct SqliteCacheStore {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStore {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Whether an entry created at `created_at` has outlived `ttl_ms` by `now`
    fn is_expired(created_at: DateTime<Utc>, ttl_ms: i64, now: DateTime<Utc>) -> bool {
        (now - created_at).num_milliseconds() > ttl_ms
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CacheError::Corrupt(format!("created_at '{}': {}", raw, e)))
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT value, created_at, ttl_ms FROM response_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        let Some((value, created_at, ttl_ms)) = row else {
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        let created_at = parse_timestamp(&created_at)?;
        if Self::is_expired(created_at, ttl_ms, self.clock.now()) {
            tracing::debug!(key = %key, "Cache entry expired");
            return Ok(None);
        }

        tracing::debug!(key = %key, "Cache hit");
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let created_at = self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO response_cache (cache_key, value, created_at, ttl_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                ttl_ms = excluded.ttl_ms
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&created_at)
        .bind(ttl_ms)
        .execute(&self.db)
        .await?;

        tracing::debug!(key = %key, ttl_ms, "Cache entry stored");
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT cache_key, created_at, ttl_ms FROM response_cache")
                .fetch_all(&self.db)
                .await?;

        // Unreadable timestamps can never be served again, so they go too
        let expired: Vec<String> = rows
            .into_iter()
            .filter(|(_, created_at, ttl_ms)| match parse_timestamp(created_at) {
                Ok(ts) => Self::is_expired(ts, *ttl_ms, now),
                Err(_) => true,
            })
            .map(|(key, _, _)| key)
            .collect();

        let mut tx = self.db.begin().await?;
        let mut removed = 0u64;
        for key in &expired {
            removed += sqlx::query("DELETE FROM response_cache WHERE cache_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        tracing::info!(removed, "Purged expired cache entries");
        Ok(removed)
    }
}
