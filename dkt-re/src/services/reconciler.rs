//! Event reconciliation
//!
//! Matches a freshly supplied batch of events against the stored enrichment
//! records of one parent. Only events with no record, or with a record whose
//! payload is unusable, are sent to the analyzer; everything else is skipped.
//!
//! Per-event failures are counted and the batch carries on. The only
//! batch-level failure is being unable to load existing records, in which
//! case nothing is written.

use std::collections::HashMap;
use std::sync::Arc;

use dkt_common::Clock;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::db::records::EnrichmentStore;
use crate::error::{AnalysisError, ReconcileError};
use crate::models::{EnrichmentRecord, Event, Summary};
use crate::services::analysis_provider::{AnalysisRequest, Analyzer};
use crate::services::fingerprinter::{fingerprint, Fingerprint};
use crate::services::validity_classifier::{classify, Classification};

/// What a non-skipped event turned into
enum Outcome {
    Written,
    Failed,
}

pub struct Reconciler {
    store: Arc<dyn EnrichmentStore>,
    analyzer: Arc<dyn Analyzer>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn EnrichmentStore>,
        analyzer: Arc<dyn Analyzer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            analyzer,
            clock,
        }
    }

    /// Reconcile `events` for `parent_id`
    ///
    /// Events are processed in input order. Cancellation is observed before
    /// each event and while one is in flight; an abandoned in-flight event is
    /// counted as neither written nor failed. A cancelled run returns the
    /// partial summary with `cancelled` set.
    pub async fn reconcile(
        &self,
        parent_id: &str,
        events: &[Event],
        context_hint: &str,
        cancel: &CancellationToken,
    ) -> Result<Summary, ReconcileError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("reconcile", %run_id, parent_id = %parent_id);
        self.run(parent_id, events, context_hint, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        parent_id: &str,
        events: &[Event],
        context_hint: &str,
        cancel: &CancellationToken,
    ) -> Result<Summary, ReconcileError> {
        let fingerprints: Vec<Fingerprint> = events
            .iter()
            .map(|event| fingerprint(parent_id, &event.occurred_at, &event.text))
            .collect();

        let mut known: HashMap<Fingerprint, EnrichmentRecord> = self
            .store
            .load_records(parent_id)
            .await
            .map_err(|source| ReconcileError::Load {
                parent_id: parent_id.to_string(),
                source,
            })?
            .into_iter()
            .map(|record| (record.fingerprint.clone(), record))
            .collect();

        tracing::info!(
            events = events.len(),
            existing = known.len(),
            "Starting reconciliation"
        );

        let mut summary = Summary::default();

        for (index, (event, fp)) in events.iter().zip(fingerprints).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    remaining = events.len() - index,
                    "Reconciliation cancelled"
                );
                summary.cancelled = true;
                break;
            }

            if !event.belongs_to(parent_id) {
                tracing::warn!(
                    index,
                    event_parent = ?event.parent_id,
                    "Event belongs to another parent, not analysed"
                );
                summary.failed += 1;
                continue;
            }

            let existing = known.get(&fp);
            let reprocess = match classify(existing) {
                Classification::Valid => {
                    summary.skipped += 1;
                    continue;
                }
                Classification::Missing => false,
                Classification::Invalid(reason) => {
                    tracing::info!(
                        fingerprint = %fp,
                        reason = %reason,
                        "Reprocessing invalid record"
                    );
                    true
                }
            };

            if summary.quota_exhausted {
                summary.failed += 1;
                continue;
            }

            let created_at = existing.map(|record| record.created_at);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        index,
                        remaining = events.len() - index,
                        "Reconciliation cancelled with an event in flight"
                    );
                    summary.cancelled = true;
                    break;
                }
                outcome = self.process(
                    parent_id,
                    event,
                    fp,
                    created_at,
                    context_hint,
                    &mut known,
                ) => outcome,
            };

            match outcome {
                Ok(Outcome::Written) if reprocess => summary.reprocessed += 1,
                Ok(Outcome::Written) => summary.inserted += 1,
                Ok(Outcome::Failed) => summary.failed += 1,
                Err(AnalysisError::QuotaExceeded { limit }) => {
                    tracing::warn!(limit, "Analysis quota exhausted, remaining events deferred");
                    summary.quota_exhausted = true;
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "Analysis failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            inserted = summary.inserted,
            reprocessed = summary.reprocessed,
            skipped = summary.skipped,
            failed = summary.failed,
            quota_exhausted = summary.quota_exhausted,
            cancelled = summary.cancelled,
            "Reconciliation finished"
        );

        Ok(summary)
    }

    /// Analyse one event and persist the result
    ///
    /// Analyzer errors are returned to the caller; a failed upsert is logged
    /// and reported as [`Outcome::Failed`].
    async fn process(
        &self,
        parent_id: &str,
        event: &Event,
        fp: Fingerprint,
        created_at: Option<chrono::DateTime<chrono::Utc>>,
        context_hint: &str,
        known: &mut HashMap<Fingerprint, EnrichmentRecord>,
    ) -> Result<Outcome, AnalysisError> {
        let request = AnalysisRequest {
            text: &event.text,
            supplementary_text: event.supplementary_text.as_deref(),
            context_hint,
        };
        let payload = self.analyzer.analyze(&request).await?;

        let mut record =
            EnrichmentRecord::from_analysis(fp, parent_id, event, &payload, self.clock.now());
        if let Some(created_at) = created_at {
            record.created_at = created_at;
        }

        if let Err(e) = self.store.upsert(&record).await {
            tracing::error!(fingerprint = %record.fingerprint, error = %e, "Failed to store record");
            return Ok(Outcome::Failed);
        }

        known.insert(record.fingerprint.clone(), record);
        Ok(Outcome::Written)
    }
}
