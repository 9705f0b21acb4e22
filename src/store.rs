//! Data-access collaborator
//!
//! The tracker never owns persistence. It talks to a [`HabitStore`], and the
//! crate ships [`MemoryStore`], an in-process implementation that can be
//! snapshotted to and restored from JSON between sessions.

use crate::badges::default_badge_rules;
use crate::error::EngineError;
use crate::schema::EventLog;
use crate::types::{BadgeRule, Habit, HabitEvent, UnlockedBadge, UserProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Storage the tracker reads from and writes to.
///
/// Implementations must be safe to share between threads. The tracker
/// serializes writes per user, so a store only has to keep each call atomic.
pub trait HabitStore: Send + Sync {
    /// Whether the user has a progress record
    fn user_exists(&self, user_id: &str) -> Result<bool, EngineError>;

    /// Create a fresh progress record unless one exists; returns the stored one
    fn ensure_user(&self, user_id: &str) -> Result<UserProgress, EngineError>;

    fn habit(&self, habit_id: &str) -> Result<Option<Habit>, EngineError>;

    /// Every habit owned by the user, active or not
    fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, EngineError>;

    /// Insert a new habit; fails with `DuplicateHabit` if the id is taken
    fn insert_habit(&self, habit: Habit) -> Result<(), EngineError>;

    /// Replace an existing habit; fails with `HabitNotFound` otherwise
    fn update_habit(&self, habit: Habit) -> Result<(), EngineError>;

    fn events_for_habit(&self, habit_id: &str) -> Result<Vec<HabitEvent>, EngineError>;

    /// Events of all habits the user owns
    fn event_log_for_user(&self, user_id: &str) -> Result<EventLog, EngineError>;

    /// Insert or replace the day's entry, returning the replaced one
    fn upsert_event(&self, event: HabitEvent) -> Result<Option<HabitEvent>, EngineError>;

    fn progress(&self, user_id: &str) -> Result<Option<UserProgress>, EngineError>;

    fn save_progress(&self, progress: &UserProgress) -> Result<(), EngineError>;

    fn earned_badges(&self, user_id: &str) -> Result<Vec<UnlockedBadge>, EngineError>;

    /// Record an unlock; false when the user already holds the badge
    fn record_badge(&self, badge: UnlockedBadge) -> Result<bool, EngineError>;

    fn badge_rules(&self) -> Result<Vec<BadgeRule>, EngineError>;
}

/// Everything a [`MemoryStore`] holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub habits: BTreeMap<String, Habit>,
    #[serde(default)]
    pub events: EventLog,
    #[serde(default)]
    pub progress: BTreeMap<String, UserProgress>,
    #[serde(default)]
    pub badges: Vec<UnlockedBadge>,
    #[serde(default = "default_badge_rules")]
    pub rules: Vec<BadgeRule>,
}

/// In-memory store guarded by a single mutex
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the stock badge set
    pub fn new() -> Self {
        Self::with_rules(default_badge_rules())
    }

    pub fn with_rules(rules: Vec<BadgeRule>) -> Self {
        Self::from_state(StoreState {
            rules,
            ..Default::default()
        })
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Restore from a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let state: StoreState = serde_json::from_str(json)?;
        Ok(Self::from_state(state))
    }

    /// Snapshot to JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        let state = self.lock()?;
        Ok(serde_json::to_string(&*state)?)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Result<StoreState, EngineError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, EngineError> {
        self.state
            .lock()
            .map_err(|e| EngineError::LockPoisoned(format!("memory store: {e}")))
    }
}

impl HabitStore for MemoryStore {
    fn user_exists(&self, user_id: &str) -> Result<bool, EngineError> {
        Ok(self.lock()?.progress.contains_key(user_id))
    }

    fn ensure_user(&self, user_id: &str) -> Result<UserProgress, EngineError> {
        let mut state = self.lock()?;
        Ok(state
            .progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id))
            .clone())
    }

    fn habit(&self, habit_id: &str) -> Result<Option<Habit>, EngineError> {
        Ok(self.lock()?.habits.get(habit_id).cloned())
    }

    fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>, EngineError> {
        Ok(self
            .lock()?
            .habits
            .values()
            .filter(|h| h.owner == user_id)
            .cloned()
            .collect())
    }

    fn insert_habit(&self, habit: Habit) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        if state.habits.contains_key(&habit.id) {
            return Err(EngineError::DuplicateHabit(habit.id));
        }
        state.habits.insert(habit.id.clone(), habit);
        Ok(())
    }

    fn update_habit(&self, habit: Habit) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        match state.habits.get_mut(&habit.id) {
            Some(slot) => {
                *slot = habit;
                Ok(())
            }
            None => Err(EngineError::HabitNotFound(habit.id)),
        }
    }

    fn events_for_habit(&self, habit_id: &str) -> Result<Vec<HabitEvent>, EngineError> {
        Ok(self.lock()?.events.events_for(habit_id))
    }

    fn event_log_for_user(&self, user_id: &str) -> Result<EventLog, EngineError> {
        let state = self.lock()?;
        let events = state
            .habits
            .values()
            .filter(|h| h.owner == user_id)
            .flat_map(|h| state.events.events_for(&h.id));
        Ok(EventLog::from_events(events))
    }

    fn upsert_event(&self, event: HabitEvent) -> Result<Option<HabitEvent>, EngineError> {
        Ok(self.lock()?.events.upsert(event))
    }

    fn progress(&self, user_id: &str) -> Result<Option<UserProgress>, EngineError> {
        Ok(self.lock()?.progress.get(user_id).cloned())
    }

    fn save_progress(&self, progress: &UserProgress) -> Result<(), EngineError> {
        self.lock()?
            .progress
            .insert(progress.user_id.clone(), progress.clone());
        Ok(())
    }

    fn earned_badges(&self, user_id: &str) -> Result<Vec<UnlockedBadge>, EngineError> {
        Ok(self
            .lock()?
            .badges
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    fn record_badge(&self, badge: UnlockedBadge) -> Result<bool, EngineError> {
        let mut state = self.lock()?;
        let held = state
            .badges
            .iter()
            .any(|b| b.user_id == badge.user_id && b.badge_id == badge.badge_id);
        if held {
            return Ok(false);
        }
        state.badges.push(badge);
        Ok(true)
    }

    fn badge_rules(&self) -> Result<Vec<BadgeRule>, EngineError> {
        Ok(self.lock()?.rules.clone())
    }
}
