//! Core types for Habit Flux
//!
//! This module defines the data structures shared by every engine: habits and
//! their streak policy, logged events, user progression, badge rules and the
//! report shapes produced by the analytics aggregator.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a habit on a calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Completed,
    Skipped,
    Missed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Completed => "completed",
            EventStatus::Skipped => "skipped",
            EventStatus::Missed => "missed",
        }
    }
}

/// One logged entry for a habit on a calendar day.
///
/// At most one event exists per `(habit_id, date)`; see [`crate::schema::EventLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitEvent {
    pub habit_id: String,
    /// Calendar day the entry belongs to (no time component)
    pub date: NaiveDate,
    pub status: EventStatus,
    /// Achieved amount for measurable habits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Self-reported mood, 1-5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl HabitEvent {
    /// Create a bare event with no metadata
    pub fn new(habit_id: impl Into<String>, date: NaiveDate, status: EventStatus) -> Self {
        Self {
            habit_id: habit_id.into(),
            date,
            status,
            value: None,
            mood: None,
            duration_minutes: None,
            notes: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == EventStatus::Completed
    }
}

/// How a habit is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitType {
    #[default]
    YesNo,
    Measurable,
    TimeBased,
}

/// Scheduling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Custom,
}

/// A user-defined habit.
///
/// Only `repeat_days` decides which days a habit is due. `frequency`,
/// `category`, `start_date` and `target_value` are descriptive metadata kept
/// for clients; a `weekly` habit with no `repeat_days` is due every day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    /// Owning user id
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub frequency: Frequency,
    /// ISO weekday numbers (1 = Monday .. 7 = Sunday); empty means every day
    #[serde(default)]
    pub repeat_days: Vec<u32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub habit_type: HabitType,
    #[serde(default = "default_target_value")]
    pub target_value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    /// Skipped days keep the streak alive
    #[serde(default)]
    pub allow_skips: bool,
    /// Missed days per ISO week that keep the streak alive
    #[serde(default)]
    pub max_misses_per_week: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_target_value() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Habit {
    /// Create an active daily yes/no habit
    pub fn new(id: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
            category: None,
            frequency: Frequency::Daily,
            repeat_days: Vec::new(),
            start_date: None,
            habit_type: HabitType::YesNo,
            target_value: default_target_value(),
            unit: None,
            allow_skips: false,
            max_misses_per_week: 0,
            is_active: true,
        }
    }

    /// Streak policy derived from this habit's configuration
    pub fn streak_policy(&self) -> StreakPolicy {
        StreakPolicy {
            allow_skips: self.allow_skips,
            max_misses_per_week: self.max_misses_per_week,
            scheduled_days: self.repeat_days.clone(),
        }
    }
}

/// Per-habit rules consulted while walking a streak
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakPolicy {
    #[serde(default)]
    pub allow_skips: bool,
    #[serde(default)]
    pub max_misses_per_week: u32,
    /// ISO weekday numbers the habit is due on; empty means every day
    #[serde(default)]
    pub scheduled_days: Vec<u32>,
}

impl StreakPolicy {
    /// Whether the habit is due on `date`
    pub fn is_scheduled(&self, date: NaiveDate) -> bool {
        self.scheduled_days.is_empty()
            || self
                .scheduled_days
                .contains(&date.weekday().number_from_monday())
    }
}

/// Streak pair computed as of a reference date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<NaiveDate>,
}

/// Cumulative gamification state for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: String,
    pub xp: u64,
    pub level: u32,
    pub coins: u64,
}

impl UserProgress {
    /// Fresh progress: level 1, no XP, no coins
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            xp: 0,
            level: 1,
            coins: 0,
        }
    }
}

/// Which aggregate stat a badge rule compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Streak,
    Completion,
    Special,
}

/// Static badge definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition_type: ConditionType,
    pub threshold: u32,
    pub xp_reward: u32,
    pub coin_reward: u32,
}

/// A badge a user has earned; unique per `(user_id, badge_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockedBadge {
    pub user_id: String,
    pub badge_id: String,
    pub earned_at: DateTime<Utc>,
}

/// Aggregate stats the badge engine evaluates rules against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub max_streak_across_habits: u32,
    pub total_completions: u64,
    #[serde(default)]
    pub active_habits: u32,
}

/// Inclusive calendar window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window of `days` days ending on `end` (inclusive)
    pub fn ending_on(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - chrono::Duration::days(span),
            end,
        }
    }

    /// Number of days covered; 0 when `end` precedes `start`
    pub fn days(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            u32::try_from((self.end - self.start).num_days() + 1).unwrap_or(u32::MAX)
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Every date in the window, oldest first
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |offset| start + chrono::Duration::days(i64::from(offset)))
    }
}

/// Per-habit line in a daily rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitDayDetail {
    pub habit_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habit_name: Option<String>,
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Status counts for one calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub date: NaiveDate,
    pub completed: u32,
    pub skipped: u32,
    pub missed: u32,
    pub habits: Vec<HabitDayDetail>,
}

/// Status counts for a week or month, clipped to the analytics window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRollup {
    /// `2024-W03` for weeks, `2024-01` for months
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: u32,
    pub completed: u32,
    pub skipped: u32,
    pub missed: u32,
    /// Percentage, 0-100
    pub completion_rate: f64,
}

/// Window-level summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub habit_count: u32,
    pub window_days: u32,
    pub completed: u32,
    pub skipped: u32,
    pub missed: u32,
    /// Percentage, 0-100
    pub completion_rate: f64,
    /// Percentage of habits completed on the last day of the window
    pub end_day_completion_rate: f64,
    /// English weekday name, e.g. "Monday"
    pub best_day_of_week: Option<String>,
}

/// Per-habit stats over the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitWindowStats {
    pub habit_id: String,
    pub name: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub completions: u32,
    pub total_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub average_mood: Option<f64>,
    pub total_duration_minutes: u64,
}

/// Everything the analytics aggregator produces for a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub window: DateWindow,
    pub daily: Vec<DailyRollup>,
    pub weekly: Vec<PeriodRollup>,
    pub monthly: Vec<PeriodRollup>,
    pub summary: WindowSummary,
    pub habits: Vec<HabitWindowStats>,
}

/// English name for a weekday
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
