//! Reconciliation services
//!
//! Fingerprinting and classification are pure. The provider, its HTTP
//! transport and the reconciler are wired together by the binary.

pub mod analysis_client;
pub mod analysis_provider;
pub mod fingerprinter;
pub mod prompt_cache;
pub mod quota;
pub mod reconciler;
pub mod validity_classifier;

pub use analysis_client::HttpAnalysisTransport;
pub use analysis_provider::{AnalysisProvider, AnalysisRequest, AnalysisTransport, Analyzer};
pub use fingerprinter::{fingerprint, Fingerprint};
pub use prompt_cache::cached_or_compute;
pub use quota::{QuotaCounter, QuotaSnapshot, ResetPolicy};
pub use reconciler::Reconciler;
pub use validity_classifier::{classify, Classification, InvalidReason};
