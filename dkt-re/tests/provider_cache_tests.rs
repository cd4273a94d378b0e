//! Provider generation through the SQLite response cache

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use dkt_common::ManualClock;
use dkt_re::db::{CacheStore, SqliteCacheStore};
use dkt_re::error::AnalysisError;
use dkt_re::services::{AnalysisProvider, QuotaCounter, ResetPolicy};

use helpers::{create_memory_db, MockTransport};

#[tokio::test]
async fn test_cached_generation_skips_provider_until_expiry() {
    let pool = create_memory_db().await;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
    ));
    let transport = Arc::new(MockTransport::new("Three working days."));
    let quota = Arc::new(QuotaCounter::new(10, ResetPolicy::ProcessLifetime, clock.clone()));
    let provider = AnalysisProvider::new(transport.clone(), quota);
    let cache = SqliteCacheStore::new(pool.clone(), clock.clone());
    let ttl = Duration::from_secs(3600);
    let prompt = "How long is the deadline for an interlocutory appeal?";

    let first = provider.generate_cached(prompt, ttl, &cache).await.unwrap();
    let second = provider.generate_cached(prompt, ttl, &cache).await.unwrap();
    assert_eq!(first, "Three working days.");
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);

    clock.advance(chrono::Duration::hours(2));
    provider.generate_cached(prompt, ttl, &cache).await.unwrap();
    assert_eq!(transport.calls(), 2);

    // The refreshed entry replaced the expired one
    assert_eq!(cache.purge_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_quota_refusal_is_not_cached() {
    let pool = create_memory_db().await;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
    ));
    let transport = Arc::new(MockTransport::new("answer"));
    let quota = Arc::new(QuotaCounter::daily(0, clock.clone()));
    let provider = AnalysisProvider::new(transport.clone(), quota);
    let cache = SqliteCacheStore::new(pool.clone(), clock);

    let result = provider
        .generate_cached("anything", Duration::from_secs(60), &cache)
        .await;

    assert!(matches!(result, Err(AnalysisError::QuotaExceeded { limit: 0 })));
    assert_eq!(transport.calls(), 0);
    let cached: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM response_cache")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(cached, 0);
}
