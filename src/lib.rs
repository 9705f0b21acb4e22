//! Habit Flux - Streak, progression, badge and analytics engine for habit tracking
//!
//! Flux turns a per-habit log of daily check-ins into derived state through a
//! deterministic set of engines: streak computation → XP and levels → badge
//! evaluation, with window analytics read from the same log.
//!
//! ## Modules
//!
//! - **Engines**: [`streak`], [`progression`], [`badges`], [`analytics`] are pure and infallible
//! - **Tracker**: [`HabitTracker`] applies check-ins against a [`HabitStore`] under a per-user lock
//! - **Reports**: stateless JSON entry points for the CLI and the C ABI

pub mod analytics;
pub mod badges;
pub mod config;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod progression;
pub mod schema;
pub mod store;
pub mod streak;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use analytics::AnalyticsAggregator;
pub use badges::{default_badge_rules, BadgeEngine, GamificationEvent, SpecialCondition, SpecialConditions};
pub use config::EngineConfig;
pub use error::EngineError;
pub use pipeline::{
    analytics_report_json, badge_report_json, level_report_json, streak_report_json, CheckIn,
    CheckInOutcome, HabitTracker,
};
pub use progression::{award_xp, level_for_xp, ProgressionEngine};
pub use store::{HabitStore, MemoryStore};
pub use streak::{compute_streak, StreakEngine};

// Schema exports
pub use schema::{EventLog, EventLogAdapter, SCHEMA_VERSION};

/// Engine version embedded in all reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "habit-flux";
