//! Error types for Habit Flux

use thiserror::Error;

use crate::schema::ValidationError;

/// Errors surfaced by the tracker, the input adapters and the report helpers.
///
/// The pure engines (streak, progression, badges, analytics) are infallible;
/// everything that can fail lives around them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] ValidationError),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Habit not found: {0}")]
    HabitNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Habit {habit_id} is not owned by user {user_id}")]
    NotOwner { habit_id: String, user_id: String },

    #[error("Habit is inactive: {0}")]
    InactiveHabit(String),

    #[error("Habit already exists: {0}")]
    DuplicateHabit(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
