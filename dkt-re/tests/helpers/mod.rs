//! Test Helper Utilities
//!
//! Shared utilities for testing dkt-re

#![allow(dead_code)]

pub mod db_utils;
pub mod mock_provider;

// Re-export commonly used items
pub use db_utils::{corrupt_payload, count_records, create_file_db, create_memory_db};
pub use mock_provider::{MockTransport, ScriptedAnalyzer};

use chrono::{TimeZone, Utc};
use dkt_re::models::Event;

/// Movement on day `day` of January 2024
pub fn movement(day: u32, text: &str) -> Event {
    Event::new(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(), text)
}
