//! Database access for dkt-re
//!
//! - `records`: enrichment rows owned by the reconciler
//! - `cache`: generic TTL response cache
//! - `settings`: key/value settings

pub mod cache;
pub mod records;
pub mod settings;

pub use cache::{cache_key, CacheStore, SqliteCacheStore};
pub use records::{EnrichmentStore, SqliteEnrichmentStore};

use dkt_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the database and bring the schema up to date
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!("Connecting to database: {}", db_path.display());
    dkt_common::db::init::init_database(db_path).await
}
