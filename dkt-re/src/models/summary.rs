//! Reconciliation outcome counts

use serde::{Deserialize, Serialize};

/// Per-batch counts returned by the reconciler
///
/// A non-zero `failed` means the batch should be retried later; re-running
/// is safe because already-valid records are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub inserted: usize,
    pub reprocessed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Provider quota ran out during the batch
    pub quota_exhausted: bool,
    /// Batch stopped early on cancellation
    pub cancelled: bool,
}

impl Summary {
    /// Events that reached a final decision (written or skipped)
    pub fn settled(&self) -> usize {
        self.inserted + self.reprocessed + self.skipped
    }

    pub fn needs_retry(&self) -> bool {
        self.failed > 0 || self.cancelled
    }
}
