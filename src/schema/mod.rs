//! Habit event input schema
//!
//! This module defines how habit events enter the engine: validation of
//! individual entries, the one-entry-per-day event log, and parsers for JSON
//! arrays and NDJSON streams.

mod adapter;
mod event_log;
mod validation;

pub use adapter::*;
pub use event_log::EventLog;
pub use validation::*;
