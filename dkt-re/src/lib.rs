//! dkt-re: docket movement reconciliation
//!
//! Library interface used by the `dkt-re` binary and the integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{AnalysisError, CacheError, ReconcileError};
pub use crate::models::{EnrichmentRecord, Event, StructuredPayload, Summary};
pub use crate::services::Reconciler;
