//! Unit tests for database initialization

use dkt_common::db::init::{init_database, init_schema};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("sub").join("dkt.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dkt.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_creates_expected_tables() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(tables, vec!["enrichment_records", "response_cache", "settings"]);
}

#[tokio::test]
async fn test_schema_init_is_idempotent_and_keeps_settings() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();
    sqlx::query("UPDATE settings SET value = '9000' WHERE key = 'db_max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();

    let value: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_max_lock_wait_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value, "9000");
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'db_lock_retry_ms'")
        .execute(&pool)
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();

    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_lock_retry_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("250"));
}

#[tokio::test]
async fn test_duplicate_fingerprint_rejected_by_unique_constraint() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    let fp = "a".repeat(64);
    let insert = "INSERT INTO enrichment_records \
        (parent_id, fingerprint, occurred_at, raw_text, created_at, updated_at) \
        VALUES ('p', ?, '2024-01-01T00:00:00Z', 't', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')";

    sqlx::query(insert).bind(&fp).execute(&pool).await.unwrap();
    let second = sqlx::query(insert).bind(&fp).execute(&pool).await;

    assert!(second.is_err());
}
