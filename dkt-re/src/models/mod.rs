//! Data models for dkt-re (Reconciliation Engine)

pub mod enrichment;
pub mod event;
pub mod summary;

pub use enrichment::{EnrichmentRecord, StructuredPayload};
pub use event::Event;
pub use summary::Summary;
