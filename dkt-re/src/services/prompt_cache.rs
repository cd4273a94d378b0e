//! Read-through caching for expensive computations
//!
//! The cache only ever saves work. A failed read is treated as a miss and a
//! failed write just means the result is not cached this time; neither
//! prevents the caller from getting a value.

use std::future::Future;
use std::time::Duration;

use crate::db::cache::CacheStore;

/// Return the cached value for `key`, or compute, store and return it
///
/// Errors from `compute` propagate and nothing is cached for them.
pub async fn cached_or_compute<F, Fut, E>(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<String, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, E>>,
{
    match cache.get(key).await {
        Ok(Some(value)) => return Ok(value),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cache read failed, computing value");
        }
    }

    let value = compute().await?;

    if let Err(e) = cache.put(key, &value, ttl).await {
        tracing::warn!(key = %key, error = %e, "Cache write failed, value not cached");
    }

    Ok(value)
}
