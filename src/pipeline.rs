//! Pipeline orchestration
//!
//! This module provides the public API for Habit Flux. [`HabitTracker`] runs
//! check-ins end to end against a [`HabitStore`]; the `*_report_json`
//! functions are one-shot, stateless entry points over JSON input used by the
//! CLI and the FFI layer.

use crate::analytics::AnalyticsAggregator;
use crate::badges::{BadgeEngine, BadgeEvaluation, GamificationEvent, SpecialConditions};
use crate::config::EngineConfig;
use crate::encoder::{ReportEncoder, ReportKind};
use crate::error::EngineError;
use crate::progression::{LevelProgress, ProgressionEngine};
use crate::schema::{validate_event, EventLog, EventLogAdapter, ValidationError};
use crate::store::{HabitStore, MemoryStore};
use crate::streak::StreakEngine;
use crate::types::{
    AnalyticsReport, BadgeRule, DateWindow, EventStatus, Habit, HabitEvent, StreakSummary,
    UnlockedBadge, UserProgress, UserStats,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A check-in as submitted by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub date: NaiveDate,
    #[serde(default = "default_status")]
    pub status: EventStatus,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub mood: Option<u8>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_status() -> EventStatus {
    EventStatus::Completed
}

impl CheckIn {
    pub fn new(date: NaiveDate, status: EventStatus) -> Self {
        Self {
            date,
            status,
            value: None,
            mood: None,
            duration_minutes: None,
            notes: None,
        }
    }

    pub fn completed(date: NaiveDate) -> Self {
        Self::new(date, EventStatus::Completed)
    }

    pub fn into_event(self, habit_id: &str) -> HabitEvent {
        HabitEvent {
            habit_id: habit_id.to_string(),
            date: self.date,
            status: self.status,
            value: self.value,
            mood: self.mood,
            duration_minutes: self.duration_minutes,
            notes: self.notes,
        }
    }
}

impl From<HabitEvent> for CheckIn {
    fn from(event: HabitEvent) -> Self {
        Self {
            date: event.date,
            status: event.status,
            value: event.value,
            mood: event.mood,
            duration_minutes: event.duration_minutes,
            notes: event.notes,
        }
    }
}

/// Result of registering a habit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitRegistration {
    pub habit: Habit,
    pub progress: UserProgress,
    pub events: Vec<GamificationEvent>,
}

/// Everything a check-in changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInOutcome {
    pub event: HabitEvent,
    /// Entry the check-in replaced, if the day was already logged
    pub previous: Option<HabitEvent>,
    pub xp_awarded: u64,
    pub progress: UserProgress,
    pub streak: StreakSummary,
    pub unlocked: Vec<BadgeRule>,
    pub events: Vec<GamificationEvent>,
}

/// A user's gamification profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub progress: UserProgress,
    pub level: LevelProgress,
    pub badges: Vec<UnlockedBadge>,
    pub stats: UserStats,
}

/// Stateful tracker over a store.
///
/// Writes for one user are serialized: a check-in reads the previous entry,
/// upserts, awards XP, evaluates badges and persists the result while
/// holding that user's lock, so concurrent check-ins never double-award.
pub struct HabitTracker<S: HabitStore> {
    store: S,
    config: EngineConfig,
    progression: ProgressionEngine,
    badges: BadgeEngine,
    encoder: ReportEncoder,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for HabitTracker<MemoryStore> {
    fn default() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: HabitStore> HabitTracker<S> {
    /// Create a tracker with default settings
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        let progression = ProgressionEngine::new(&config.progression);
        Self {
            store,
            badges: BadgeEngine::new(progression.clone()),
            progression,
            config,
            encoder: ReportEncoder::new(),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Install predicates for `special` badge rules
    pub fn with_special_conditions(mut self, specials: SpecialConditions) -> Self {
        self.badges = BadgeEngine::new(self.progression.clone()).with_specials(specials);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn encoder(&self) -> &ReportEncoder {
        &self.encoder
    }

    /// Create the user's progress record if it does not exist yet
    pub fn register_user(&self, user_id: &str) -> Result<UserProgress, EngineError> {
        self.store.ensure_user(user_id)
    }

    /// Store a new habit and grant the creation XP to its owner
    pub fn register_habit(&self, habit: Habit) -> Result<HabitRegistration, EngineError> {
        let lock = self.user_lock(&habit.owner)?;
        let _guard = lock.lock().map_err(|e| poisoned(&habit.owner, e))?;

        let progress = self.require_progress(&habit.owner)?;
        self.store.insert_habit(habit.clone())?;

        let mut events = Vec::new();
        let progress = self.grant_xp(
            &progress,
            self.config.rewards.xp_per_habit_created,
            "Habit created",
            &mut events,
        );
        self.store.save_progress(&progress)?;

        info!(user_id = %habit.owner, habit_id = %habit.id, "habit registered");
        Ok(HabitRegistration {
            habit,
            progress,
            events,
        })
    }

    /// Soft-delete a habit; its history is kept
    pub fn deactivate_habit(&self, user_id: &str, habit_id: &str) -> Result<Habit, EngineError> {
        let lock = self.user_lock(user_id)?;
        let _guard = lock.lock().map_err(|e| poisoned(user_id, e))?;

        let mut habit = self.owned_habit(user_id, habit_id)?;
        habit.is_active = false;
        self.store.update_habit(habit.clone())?;
        info!(user_id, habit_id, "habit deactivated");
        Ok(habit)
    }

    /// Log a day for a habit and apply every reward it earns.
    ///
    /// Completion XP is granted only when the day was not already completed.
    /// Days after `now` are rejected. Streaks and badge stats are taken as of
    /// the date of `now`.
    pub fn check_in(
        &self,
        user_id: &str,
        habit_id: &str,
        check_in: CheckIn,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome, EngineError> {
        let lock = self.user_lock(user_id)?;
        let _guard = lock.lock().map_err(|e| poisoned(user_id, e))?;

        let habit = self.owned_habit(user_id, habit_id)?;
        if !habit.is_active {
            return Err(EngineError::InactiveHabit(habit_id.to_string()));
        }

        let today = now.date_naive();
        let event = check_in.into_event(habit_id);
        let checked = validate_event(&event, Some(&habit)).and_then(|()| {
            if event.date > today {
                Err(ValidationError::FutureDate {
                    date: event.date,
                    today,
                })
            } else {
                Ok(())
            }
        });
        if let Err(e) = checked {
            warn!(user_id, habit_id, error = %e, "rejected check-in");
            return Err(e.into());
        }

        let progress = self.require_progress(user_id)?;
        let previous = self.store.upsert_event(event.clone())?;

        let newly_completed =
            event.is_completed() && !previous.as_ref().is_some_and(|p| p.is_completed());
        let xp_awarded = if newly_completed {
            self.config.rewards.xp_per_completion
        } else {
            0
        };

        let mut events = Vec::new();
        let progress = self.grant_xp(&progress, xp_awarded, "Habit completed", &mut events);

        let evaluation = self.evaluate_badges(user_id, &progress, today, now)?;
        for badge in &evaluation.badges {
            self.store.record_badge(badge.clone())?;
        }
        self.store.save_progress(&evaluation.progress)?;
        events.extend(evaluation.events);

        let streak = StreakEngine::compute(
            &self.store.events_for_habit(habit_id)?,
            today,
            &habit.streak_policy(),
        );

        debug!(
            user_id,
            habit_id,
            status = event.status.as_str(),
            xp_awarded,
            current_streak = streak.current,
            "check-in applied"
        );

        Ok(CheckInOutcome {
            event,
            previous,
            xp_awarded,
            progress: evaluation.progress,
            streak,
            unlocked: evaluation.unlocked,
            events,
        })
    }

    /// Streak for one of the user's habits
    pub fn streak(&self, user_id: &str, habit_id: &str, as_of: NaiveDate) -> Result<StreakSummary, EngineError> {
        let habit = self.owned_habit(user_id, habit_id)?;
        let events = self.store.events_for_habit(habit_id)?;
        Ok(StreakEngine::compute(&events, as_of, &habit.streak_policy()))
    }

    /// Analytics over the user's active habits
    pub fn analytics(&self, user_id: &str, window: DateWindow) -> Result<AnalyticsReport, EngineError> {
        self.require_progress(user_id)?;
        let habits: Vec<Habit> = self
            .store
            .habits_for_user(user_id)?
            .into_iter()
            .filter(|h| h.is_active)
            .collect();
        let log = self.store.event_log_for_user(user_id)?;
        let events: Vec<HabitEvent> = log.iter().cloned().collect();
        Ok(AnalyticsAggregator::aggregate(&habits, &events, window))
    }

    /// Analytics over the configured default window ending on `end`
    pub fn analytics_ending(&self, user_id: &str, end: NaiveDate) -> Result<AnalyticsReport, EngineError> {
        let window = DateWindow::ending_on(end, self.config.analytics.default_window_days);
        self.analytics(user_id, window)
    }

    /// Aggregate stats the badge rules are checked against
    pub fn user_stats(&self, user_id: &str, as_of: NaiveDate) -> Result<UserStats, EngineError> {
        let active: Vec<Habit> = self
            .store
            .habits_for_user(user_id)?
            .into_iter()
            .filter(|h| h.is_active)
            .collect();
        let log = self.store.event_log_for_user(user_id)?;

        Ok(UserStats {
            max_streak_across_habits: StreakEngine::max_longest(&active, &log, as_of),
            total_completions: log.iter().filter(|e| e.is_completed()).count() as u64,
            active_habits: active.len() as u32,
        })
    }

    pub fn profile(&self, user_id: &str, as_of: NaiveDate) -> Result<UserProfile, EngineError> {
        let progress = self.require_progress(user_id)?;
        Ok(UserProfile {
            level: self.progression.level_progress(progress.xp),
            badges: self.store.earned_badges(user_id)?,
            stats: self.user_stats(user_id, as_of)?,
            progress,
        })
    }

    fn evaluate_badges(
        &self,
        user_id: &str,
        progress: &UserProgress,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<BadgeEvaluation, EngineError> {
        let stats = self.user_stats(user_id, as_of)?;
        let earned: HashSet<String> = self
            .store
            .earned_badges(user_id)?
            .into_iter()
            .map(|b| b.badge_id)
            .collect();
        let rules = self.store.badge_rules()?;
        Ok(self
            .badges
            .evaluate(user_id, &stats, &rules, &earned, progress, now))
    }

    fn grant_xp(
        &self,
        progress: &UserProgress,
        amount: u64,
        reason: &str,
        events: &mut Vec<GamificationEvent>,
    ) -> UserProgress {
        if amount == 0 {
            return progress.clone();
        }
        let award = self.progression.award_xp(progress, amount);
        events.push(GamificationEvent::XpAwarded {
            amount,
            reason: reason.to_string(),
        });
        if let Some(level_up) = award.level_up {
            events.push(GamificationEvent::LevelUp {
                old_level: level_up.old_level,
                new_level: level_up.new_level,
            });
        }
        award.progress
    }

    fn owned_habit(&self, user_id: &str, habit_id: &str) -> Result<Habit, EngineError> {
        let habit = self
            .store
            .habit(habit_id)?
            .ok_or_else(|| EngineError::HabitNotFound(habit_id.to_string()))?;
        if habit.owner != user_id {
            return Err(EngineError::NotOwner {
                habit_id: habit_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(habit)
    }

    fn require_progress(&self, user_id: &str) -> Result<UserProgress, EngineError> {
        self.store
            .progress(user_id)?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
    }

    /// Lock serializing the user's writes; unknown users get no entry
    fn user_lock(&self, user_id: &str) -> Result<Arc<Mutex<()>>, EngineError> {
        if !self.store.user_exists(user_id)? {
            return Err(EngineError::UserNotFound(user_id.to_string()));
        }
        let mut locks = self
            .user_locks
            .lock()
            .map_err(|e| EngineError::LockPoisoned(format!("user lock table: {e}")))?;
        Ok(locks.entry(user_id.to_string()).or_default().clone())
    }
}

impl HabitTracker<MemoryStore> {
    /// Save the whole store to JSON
    pub fn save_snapshot(&self) -> Result<String, EngineError> {
        self.store.to_json()
    }

    /// Replace the store with a JSON snapshot
    pub fn load_snapshot(&mut self, json: &str) -> Result<(), EngineError> {
        self.store = MemoryStore::from_json(json)?;
        Ok(())
    }
}

fn poisoned<T>(user_id: &str, e: std::sync::PoisonError<T>) -> EngineError {
    EngineError::LockPoisoned(format!("user {user_id}: {e}"))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(input: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::DateParseError(format!("{input}: {e}")))
}

/// Streak of one habit in a streak report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitStreakReport {
    pub habit_id: String,
    #[serde(flatten)]
    pub streak: StreakSummary,
}

/// Input for [`badge_report_json`]
#[derive(Debug, Clone, Deserialize)]
pub struct BadgeRequest {
    pub user_id: String,
    pub stats: UserStats,
    /// Badge ids the user already holds
    #[serde(default)]
    pub earned: Vec<String>,
    #[serde(default)]
    pub progress: Option<UserProgress>,
    /// Rules to evaluate; the stock set when absent
    #[serde(default)]
    pub rules: Option<Vec<BadgeRule>>,
}

/// Compute streaks for every habit in a JSON event array.
///
/// # Arguments
/// * `events_json` - JSON array of habit events
/// * `habits_json` - Optional JSON array of habits supplying streak policies
/// * `as_of` - Reference date, `YYYY-MM-DD`
///
/// Habits without a definition use the default policy.
pub fn streak_report_json(
    events_json: &str,
    habits_json: Option<&str>,
    as_of: &str,
) -> Result<String, EngineError> {
    let as_of = parse_date(as_of)?;
    let habits = match habits_json {
        Some(json) => EventLogAdapter::parse_habits(json)?,
        None => Vec::new(),
    };
    let log = EventLogAdapter::to_event_log(EventLogAdapter::parse_array(events_json)?, &habits)?;

    ReportEncoder::new().encode_to_json(ReportKind::Streak, &habit_streaks(&log, &habits, as_of))
}

/// Streak of every habit in `log`, using the policy of the matching habit
/// definition or the default one
pub fn habit_streaks(log: &EventLog, habits: &[Habit], as_of: NaiveDate) -> Vec<HabitStreakReport> {
    log.habit_ids()
        .into_iter()
        .map(|habit_id| {
            let policy = habits
                .iter()
                .find(|h| h.id == habit_id)
                .map(Habit::streak_policy)
                .unwrap_or_default();
            let streak = StreakEngine::compute(&log.events_for(&habit_id), as_of, &policy);
            HabitStreakReport { habit_id, streak }
        })
        .collect()
}

/// Aggregate analytics over `start..=end` from JSON habits and events
pub fn analytics_report_json(
    habits_json: &str,
    events_json: &str,
    start: &str,
    end: &str,
) -> Result<String, EngineError> {
    let window = DateWindow::new(parse_date(start)?, parse_date(end)?);
    let habits = EventLogAdapter::parse_habits(habits_json)?;
    let log = EventLogAdapter::to_event_log(EventLogAdapter::parse_array(events_json)?, &habits)?;
    let events: Vec<HabitEvent> = log.iter().cloned().collect();

    let report = AnalyticsAggregator::aggregate(&habits, &events, window);
    ReportEncoder::new().encode_to_json(ReportKind::Analytics, &report)
}

/// Level progress for a cumulative XP total on the default curve
pub fn level_report_json(xp: u64) -> Result<String, EngineError> {
    let progress = ProgressionEngine::default().level_progress(xp);
    ReportEncoder::new().encode_to_json(ReportKind::Level, &progress)
}

/// Evaluate badges for a [`BadgeRequest`] given as JSON
pub fn badge_report_json(request_json: &str) -> Result<String, EngineError> {
    let request: BadgeRequest = serde_json::from_str(request_json)?;
    let evaluation = evaluate_badge_request(&BadgeEngine::default(), request, Utc::now());
    ReportEncoder::new().encode_to_json(ReportKind::Badges, &evaluation)
}

/// Run a [`BadgeRequest`] through `engine`
pub fn evaluate_badge_request(
    engine: &BadgeEngine,
    request: BadgeRequest,
    now: DateTime<Utc>,
) -> BadgeEvaluation {
    let rules = request.rules.unwrap_or_else(crate::badges::default_badge_rules);
    let progress = request
        .progress
        .unwrap_or_else(|| UserProgress::new(request.user_id.clone()));
    let earned: HashSet<String> = request.earned.into_iter().collect();
    engine.evaluate(&request.user_id, &request.stats, &rules, &earned, &progress, now)
}
