//! Database Test Utilities

use dkt_re::services::Fingerprint;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// In-memory database with the full schema
///
/// Single connection, since every `sqlite::memory:` connection is its own
/// database.
pub async fn create_memory_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    dkt_common::db::init::init_schema(&pool).await.unwrap();
    pool
}

/// File database opened the way the binary opens it
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_file_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = dkt_common::config::database_path(temp_dir.path());
    let pool = dkt_re::db::init_database_pool(&db_path).await.unwrap();
    (temp_dir, pool)
}

pub async fn count_records(pool: &SqlitePool, parent_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM enrichment_records WHERE parent_id = ?")
        .bind(parent_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Overwrite one stored payload, as a failed earlier analysis would have left it
pub async fn corrupt_payload(pool: &SqlitePool, parent_id: &str, fp: &Fingerprint, payload: &str) {
    let updated = sqlx::query(
        "UPDATE enrichment_records SET payload = ? WHERE parent_id = ? AND fingerprint = ?",
    )
    .bind(payload)
    .bind(parent_id)
    .bind(fp.as_str())
    .execute(pool)
    .await
    .unwrap()
    .rows_affected();
    assert_eq!(updated, 1, "expected exactly one record to corrupt");
}
