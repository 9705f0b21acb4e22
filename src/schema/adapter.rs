//! Parsers turning JSON / NDJSON input into validated habit events

use crate::error::EngineError;
use crate::schema::event_log::EventLog;
use crate::schema::validation::{validate_event, ValidationError};
use crate::types::{Habit, HabitEvent};
use std::collections::HashMap;

/// Adapter for loading habit events and habits from serialized input
pub struct EventLogAdapter;

impl EventLogAdapter {
    /// Parse a JSON string containing an array of HabitEvents
    pub fn parse_array(json: &str) -> Result<Vec<HabitEvent>, EngineError> {
        let events: Vec<HabitEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing HabitEvents
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<HabitEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<HabitEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse a JSON array of habits
    pub fn parse_habits(json: &str) -> Result<Vec<Habit>, EngineError> {
        let habits: Vec<Habit> = serde_json::from_str(json)?;
        Ok(habits)
    }

    /// Validate events and fold them into a one-per-day log.
    ///
    /// Events whose habit appears in `habits` are checked against it; others
    /// only get the habit-independent checks. The first invalid event aborts.
    pub fn to_event_log(events: Vec<HabitEvent>, habits: &[Habit]) -> Result<EventLog, EngineError> {
        let by_id: HashMap<&str, &Habit> = habits.iter().map(|h| (h.id.as_str(), h)).collect();

        for event in &events {
            validate_event(event, by_id.get(event.habit_id.as_str()).copied())?;
        }

        Ok(EventLog::from_events(events))
    }

    /// Validate a batch of events, returning only the failures
    pub fn validate_events(events: &[HabitEvent], habits: &[Habit]) -> Vec<ValidationResult> {
        let by_id: HashMap<&str, &Habit> = habits.iter().map(|h| (h.id.as_str(), h)).collect();

        events
            .iter()
            .enumerate()
            .map(|(idx, event)| ValidationResult {
                index: idx,
                habit_id: event.habit_id.clone(),
                date: event.date.to_string(),
                result: validate_event(event, by_id.get(event.habit_id.as_str()).copied()).err(),
            })
            .filter(|r| r.result.is_some())
            .collect()
    }
}

/// Result of event validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub habit_id: String,
    pub date: String,
    pub result: Option<ValidationError>,
}
