//! Input validation for habit events
//!
//! The engines treat `value` as an opaque optional number and never range-check
//! it. Rejecting malformed entries is the job of this layer, before anything is
//! written to the event log.

use crate::types::{Habit, HabitEvent, HabitType};
use chrono::NaiveDate;

/// Current habit event schema identifier
pub const SCHEMA_VERSION: &str = "habit.event.v1";

/// Lowest accepted mood rating
pub const MOOD_MIN: u8 = 1;

/// Highest accepted mood rating
pub const MOOD_MAX: u8 = 5;

/// Validation errors for habit events
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Event has an empty habit_id")]
    EmptyHabitId,

    #[error("Event for habit {actual} submitted against habit {expected}")]
    HabitMismatch { expected: String, actual: String },

    #[error("Mood {mood} is outside {min}-{max}")]
    MoodOutOfRange { mood: u8, min: u8, max: u8 },

    #[error("Value is not a finite number")]
    NonFiniteValue,

    #[error("Value {value} is negative for a {habit_type} habit")]
    NegativeValue { value: f64, habit_type: String },

    #[error("Check-in for {date} is after today ({today})")]
    FutureDate { date: NaiveDate, today: NaiveDate },
}

/// Validate a single event, optionally against the habit it belongs to.
///
/// Without a habit only habit-independent checks run (id, mood, finiteness).
pub fn validate_event(event: &HabitEvent, habit: Option<&Habit>) -> Result<(), ValidationError> {
    if event.habit_id.trim().is_empty() {
        return Err(ValidationError::EmptyHabitId);
    }

    if let Some(mood) = event.mood {
        if !(MOOD_MIN..=MOOD_MAX).contains(&mood) {
            return Err(ValidationError::MoodOutOfRange {
                mood,
                min: MOOD_MIN,
                max: MOOD_MAX,
            });
        }
    }

    if let Some(value) = event.value {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue);
        }
    }

    let Some(habit) = habit else {
        return Ok(());
    };

    if habit.id != event.habit_id {
        return Err(ValidationError::HabitMismatch {
            expected: habit.id.clone(),
            actual: event.habit_id.clone(),
        });
    }

    match (habit.habit_type, event.value) {
        (HabitType::Measurable, Some(value)) if value < 0.0 => Err(ValidationError::NegativeValue {
            value,
            habit_type: "measurable".to_string(),
        }),
        (HabitType::TimeBased, Some(value)) if value < 0.0 => Err(ValidationError::NegativeValue {
            value,
            habit_type: "time_based".to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventStatus;
    use chrono::NaiveDate;

    fn event(habit_id: &str) -> HabitEvent {
        HabitEvent::new(
            habit_id,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            EventStatus::Completed,
        )
    }

    #[test]
    fn test_valid_event() {
        let mut e = event("h1");
        e.mood = Some(4);
        e.value = Some(2.5);
        assert!(validate_event(&e, None).is_ok());
    }

    #[test]
    fn test_empty_habit_id() {
        assert_eq!(
            validate_event(&event("  "), None),
            Err(ValidationError::EmptyHabitId)
        );
    }

    #[test]
    fn test_mood_range() {
        let mut e = event("h1");
        e.mood = Some(0);
        assert!(matches!(
            validate_event(&e, None),
            Err(ValidationError::MoodOutOfRange { mood: 0, .. })
        ));
        e.mood = Some(6);
        assert!(validate_event(&e, None).is_err());
    }

    #[test]
    fn test_non_finite_value() {
        let mut e = event("h1");
        e.value = Some(f64::NAN);
        assert_eq!(validate_event(&e, None), Err(ValidationError::NonFiniteValue));
    }

    #[test]
    fn test_negative_value_depends_on_habit_type() {
        let mut e = event("h1");
        e.value = Some(-3.0);

        let mut habit = Habit::new("h1", "u1", "Water");
        // Yes/no habits carry no meaningful value, so nothing to reject
        assert!(validate_event(&e, Some(&habit)).is_ok());

        habit.habit_type = HabitType::Measurable;
        assert!(matches!(
            validate_event(&e, Some(&habit)),
            Err(ValidationError::NegativeValue { .. })
        ));
    }

    #[test]
    fn test_habit_mismatch() {
        let habit = Habit::new("h2", "u1", "Run");
        assert!(matches!(
            validate_event(&event("h1"), Some(&habit)),
            Err(ValidationError::HabitMismatch { .. })
        ));
    }
}
