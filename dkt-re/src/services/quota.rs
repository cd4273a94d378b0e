//! Analysis call quota
//!
//! Counts dispatched provider calls per window. The window resets at local
//! midnight for a configured UTC offset, or never (process lifetime).
//! Shared across concurrent reconciliations through `Arc`; all reads and
//! increments happen under one mutex so two callers can never both take the
//! last slot.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use dkt_common::Clock;
use std::sync::{Arc, Mutex};

use crate::error::AnalysisError;

/// When the counter starts over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Reset at midnight of the wall clock `utc_offset_hours` from UTC
    Daily { utc_offset_hours: i32 },
    /// Never reset; the count lives as long as the process
    ProcessLifetime,
}

impl ResetPolicy {
    /// Offset of the reset wall clock; out-of-range hours fall back to UTC
    fn offset(&self) -> Option<FixedOffset> {
        match self {
            ResetPolicy::Daily { utc_offset_hours } => Some(
                utc_offset_hours
                    .checked_mul(3600)
                    .and_then(FixedOffset::east_opt)
                    .unwrap_or_else(|| Utc.fix()),
            ),
            ResetPolicy::ProcessLifetime => None,
        }
    }

    fn window(&self, now: DateTime<Utc>) -> Option<NaiveDate> {
        self.offset()
            .map(|offset| now.with_timezone(&offset).date_naive())
    }
}

#[derive(Debug)]
struct QuotaState {
    window: Option<NaiveDate>,
    used: u32,
}

/// Point-in-time view of the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub used: u32,
    pub limit: u32,
}

impl QuotaSnapshot {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Per-window counter of provider calls
pub struct QuotaCounter {
    limit: u32,
    policy: ResetPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<QuotaState>,
}

impl QuotaCounter {
    pub fn new(limit: u32, policy: ResetPolicy, clock: Arc<dyn Clock>) -> Self {
        let window = policy.window(clock.now());
        Self {
            limit,
            policy,
            clock,
            state: Mutex::new(QuotaState { window, used: 0 }),
        }
    }

    /// Daily counter resetting at UTC midnight
    pub fn daily(limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self::new(limit, ResetPolicy::Daily { utc_offset_hours: 0 }, clock)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Reserve one call slot, or fail without consuming anything
    pub fn try_acquire(&self) -> Result<QuotaSnapshot, AnalysisError> {
        let mut state = self.lock_current();

        if state.used >= self.limit {
            tracing::warn!(
                used = state.used,
                limit = self.limit,
                "Analysis quota exhausted"
            );
            return Err(AnalysisError::QuotaExceeded { limit: self.limit });
        }

        state.used += 1;
        Ok(QuotaSnapshot {
            used: state.used,
            limit: self.limit,
        })
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        let state = self.lock_current();
        QuotaSnapshot {
            used: state.used,
            limit: self.limit,
        }
    }

    /// Time until the next reset, if the policy has one
    pub fn time_until_reset(&self) -> Option<Duration> {
        let offset = self.policy.offset()?;
        let now = self.clock.now();
        let today = self.policy.window(now)?;
        let next_local_midnight = today.succ_opt()?.and_hms_opt(0, 0, 0)?;
        let next_reset_utc =
            next_local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
        Some(next_reset_utc.and_utc() - now)
    }

    /// Lock the state, rolling the window forward if the clock crossed a reset
    fn lock_current(&self) -> std::sync::MutexGuard<'_, QuotaState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.policy.window(self.clock.now());

        if window != state.window {
            tracing::info!(
                previous_used = state.used,
                "Analysis quota window reset"
            );
            state.window = window;
            state.used = 0;
        }

        state
    }
}
