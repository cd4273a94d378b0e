//! # DKT Common Library
//!
//! Shared code for the DKT docket services including:
//! - Error and result types
//! - Injectable clock used for TTL and quota decisions
//! - TOML configuration loading and root folder resolution
//! - SQLite database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
