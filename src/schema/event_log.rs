//! One-entry-per-day habit event log

use crate::types::{DateWindow, HabitEvent};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Append-or-replace log of habit events keyed by `(habit_id, date)`.
///
/// A later write for the same habit and date replaces the earlier one, so the
/// log never holds two entries for the same day. Iteration is ordered by habit
/// id, then date. Serializes as a flat JSON array of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<HabitEvent>", into = "Vec<HabitEvent>")]
pub struct EventLog {
    entries: BTreeMap<(String, NaiveDate), HabitEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from events in arrival order; later duplicates win
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = HabitEvent>,
    {
        let mut log = Self::new();
        for event in events {
            log.upsert(event);
        }
        log
    }

    /// Insert or replace the entry for the event's habit and date.
    ///
    /// Returns the entry that was replaced, if any.
    pub fn upsert(&mut self, event: HabitEvent) -> Option<HabitEvent> {
        self.entries
            .insert((event.habit_id.clone(), event.date), event)
    }

    pub fn get(&self, habit_id: &str, date: NaiveDate) -> Option<&HabitEvent> {
        self.entries.get(&(habit_id.to_string(), date))
    }

    /// Events for one habit, oldest first
    pub fn events_for(&self, habit_id: &str) -> Vec<HabitEvent> {
        let from = (habit_id.to_string(), NaiveDate::MIN);
        let to = (habit_id.to_string(), NaiveDate::MAX);
        self.entries.range(from..=to).map(|(_, e)| e.clone()).collect()
    }

    /// Events of every habit dated inside `window`
    pub fn events_in(&self, window: &DateWindow) -> Vec<HabitEvent> {
        self.entries
            .values()
            .filter(|e| window.contains(e.date))
            .cloned()
            .collect()
    }

    /// Distinct habit ids present in the log
    pub fn habit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().map(|(id, _)| id.clone()).collect();
        ids.dedup();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &HabitEvent> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<HabitEvent>> for EventLog {
    fn from(events: Vec<HabitEvent>) -> Self {
        Self::from_events(events)
    }
}

impl From<EventLog> for Vec<HabitEvent> {
    fn from(log: EventLog) -> Self {
        log.entries.into_values().collect()
    }
}
