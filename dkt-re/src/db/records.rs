//! Enrichment record persistence
//!
//! Rows are keyed uniquely by `(parent_id, fingerprint)`. Writes go through a
//! single `INSERT ... ON CONFLICT DO UPDATE` statement, never a
//! read-then-insert, so concurrent runs for the same parent cannot create
//! duplicates or lose updates.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dkt_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::EnrichmentRecord;
use crate::services::fingerprinter::Fingerprint;
use crate::utils::{max_lock_wait_ms, retry_on_lock};

/// Storage seam used by the reconciler
#[async_trait]
pub trait EnrichmentStore: Send + Sync {
    /// All records of one parent
    async fn load_records(&self, parent_id: &str) -> Result<Vec<EnrichmentRecord>>;

    /// Insert or update in place by `(parent_id, fingerprint)`
    async fn upsert(&self, record: &EnrichmentRecord) -> Result<()>;
}

/// SQLite-backed store using the `enrichment_records` table
#[derive(Clone)]
pub struct SqliteEnrichmentStore {
    db: SqlitePool,
}

impl SqliteEnrichmentStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Single record lookup, for diagnostics
    pub async fn get_record(
        &self,
        parent_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Option<EnrichmentRecord>> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_FINGERPRINT)
            .bind(parent_id)
            .bind(fingerprint.as_str())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT fingerprint, parent_id, occurred_at, raw_text, supplementary_text,
           payload, urgent, analyzed_at, created_at
    FROM enrichment_records
    WHERE parent_id = ?
    ORDER BY occurred_at, created_at
"#;

const SELECT_COLUMNS_WHERE_FINGERPRINT: &str = r#"
    SELECT fingerprint, parent_id, occurred_at, raw_text, supplementary_text,
           payload, urgent, analyzed_at, created_at
    FROM enrichment_records
    WHERE parent_id = ? AND fingerprint = ?
"#;

#[async_trait]
impl EnrichmentStore for SqliteEnrichmentStore {
    async fn load_records(&self, parent_id: &str) -> Result<Vec<EnrichmentRecord>> {
        let rows = sqlx::query(SELECT_COLUMNS)
            .bind(parent_id)
            .fetch_all(&self.db)
            .await?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(parent_id = %parent_id, count = records.len(), "Loaded enrichment records");
        Ok(records)
    }

    async fn upsert(&self, record: &EnrichmentRecord) -> Result<()> {
        // Prepare all data BEFORE acquiring database connection
        let occurred_at = record.occurred_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let analyzed_at = record.analyzed_at.as_ref().map(format_ts);
        let created_at = format_ts(&record.created_at);
        let updated_at = format_ts(&record.analyzed_at.unwrap_or(record.created_at));
        let urgent = i64::from(record.urgent);

        let max_wait_ms = max_lock_wait_ms(&self.db).await?;

        retry_on_lock("enrichment upsert", max_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO enrichment_records (
                    parent_id, fingerprint, occurred_at, raw_text, supplementary_text,
                    payload, urgent, analyzed_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(parent_id, fingerprint) DO UPDATE SET
                    occurred_at = excluded.occurred_at,
                    raw_text = excluded.raw_text,
                    supplementary_text = excluded.supplementary_text,
                    payload = excluded.payload,
                    urgent = excluded.urgent,
                    analyzed_at = excluded.analyzed_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.parent_id)
            .bind(record.fingerprint.as_str())
            .bind(&occurred_at)
            .bind(&record.raw_text)
            .bind(&record.supplementary_text)
            .bind(&record.payload)
            .bind(urgent)
            .bind(&analyzed_at)
            .bind(&created_at)
            .bind(&updated_at)
            .execute(&self.db)
            .await
            .map_err(Error::Database)?;

            Ok(())
        })
        .await?;

        tracing::debug!(
            parent_id = %record.parent_id,
            fingerprint = %record.fingerprint,
            "Upserted enrichment record"
        );
        Ok(())
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid {} '{}' in database: {}", column, raw, e)))
}

fn record_from_row(row: &SqliteRow) -> Result<EnrichmentRecord> {
    let fingerprint_raw: String = row.try_get("fingerprint")?;
    let fingerprint = Fingerprint::from_stored(&fingerprint_raw).ok_or_else(|| {
        Error::Internal(format!("Invalid fingerprint in database: {}", fingerprint_raw))
    })?;

    let occurred_at: String = row.try_get("occurred_at")?;
    let analyzed_at: Option<String> = row.try_get("analyzed_at")?;
    let created_at: String = row.try_get("created_at")?;
    let urgent: i64 = row.try_get("urgent")?;

    Ok(EnrichmentRecord {
        fingerprint,
        parent_id: row.try_get("parent_id")?,
        occurred_at: parse_ts("occurred_at", &occurred_at)?,
        raw_text: row.try_get("raw_text")?,
        supplementary_text: row.try_get("supplementary_text")?,
        payload: row.try_get("payload")?,
        urgent: urgent != 0,
        analyzed_at: analyzed_at
            .as_deref()
            .map(|raw| parse_ts("analyzed_at", raw))
            .transpose()?,
        created_at: parse_ts("created_at", &created_at)?,
    })
}
