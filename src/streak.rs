//! Streak computation
//!
//! Turns a habit's event log into the current and longest runs of consecutive
//! completed days, honouring the habit's skip/miss policy and schedule.

use crate::schema::EventLog;
use crate::types::{EventStatus, Habit, HabitEvent, StreakPolicy, StreakSummary};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// How a single calendar day affects a streak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayKind {
    /// Completed: extends the streak by one
    Counts,
    /// Not a scheduled day for this habit
    Neutral,
    /// Skipped while skips are allowed
    ToleratedSkip,
    /// Missed, skipped without allowance, or no entry on a scheduled day
    Miss,
}

/// Streak engine for a single habit's log
pub struct StreakEngine;

impl StreakEngine {
    /// Compute current and longest streak as of `as_of`.
    ///
    /// Events dated after `as_of` are ignored. `as_of` itself is a grace day:
    /// when it holds no completion the walk starts from the day before, so an
    /// unfinished day never breaks the streak.
    pub fn compute(events: &[HabitEvent], as_of: NaiveDate, policy: &StreakPolicy) -> StreakSummary {
        let days: BTreeMap<NaiveDate, EventStatus> = events
            .iter()
            .filter(|e| e.date <= as_of)
            .map(|e| (e.date, e.status))
            .collect();

        let mut completed = days
            .iter()
            .filter(|(_, status)| **status == EventStatus::Completed)
            .map(|(date, _)| *date);

        let Some(earliest) = completed.next() else {
            return StreakSummary::default();
        };
        let last_completed = completed.last().unwrap_or(earliest);

        let current = current_run(&days, policy, earliest, as_of);
        let longest = longest_run(&days, policy, earliest, last_completed).max(current);

        debug!(current, longest, %as_of, "computed streak");

        StreakSummary {
            current,
            longest,
            last_completed: Some(last_completed),
        }
    }

    /// Compute the streak for a habit using its own policy
    pub fn for_habit(habit: &Habit, log: &EventLog, as_of: NaiveDate) -> StreakSummary {
        Self::compute(&log.events_for(&habit.id), as_of, &habit.streak_policy())
    }

    /// Best longest streak across a set of habits
    pub fn max_longest(habits: &[Habit], log: &EventLog, as_of: NaiveDate) -> u32 {
        habits
            .iter()
            .map(|h| Self::for_habit(h, log, as_of).longest)
            .max()
            .unwrap_or(0)
    }
}

/// Compute a streak with the default policy (no skips, no misses, every day scheduled)
pub fn compute_streak(events: &[HabitEvent], as_of: NaiveDate) -> StreakSummary {
    StreakEngine::compute(events, as_of, &StreakPolicy::default())
}

fn classify(
    days: &BTreeMap<NaiveDate, EventStatus>,
    policy: &StreakPolicy,
    date: NaiveDate,
) -> DayKind {
    match days.get(&date) {
        Some(EventStatus::Completed) => DayKind::Counts,
        _ if !policy.is_scheduled(date) => DayKind::Neutral,
        Some(EventStatus::Skipped) if policy.allow_skips => DayKind::ToleratedSkip,
        _ => DayKind::Miss,
    }
}

/// Tolerated misses per ISO week within one run
#[derive(Default)]
struct MissBudget {
    used: HashMap<(i32, u32), u32>,
}

impl MissBudget {
    /// Spend one miss in `date`'s week; false when the week is exhausted
    fn try_spend(&mut self, date: NaiveDate, allowance: u32) -> bool {
        let week = date.iso_week();
        let used = self.used.entry((week.year(), week.week())).or_insert(0);
        if *used >= allowance {
            return false;
        }
        *used += 1;
        true
    }

    fn reset(&mut self) {
        self.used.clear();
    }
}

/// Walk backwards from `as_of` until the first untolerated gap
fn current_run(
    days: &BTreeMap<NaiveDate, EventStatus>,
    policy: &StreakPolicy,
    earliest: NaiveDate,
    as_of: NaiveDate,
) -> u32 {
    let mut cursor = as_of;
    if classify(days, policy, cursor) != DayKind::Counts {
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => return 0,
        }
    }

    let mut run = 0;
    let mut budget = MissBudget::default();

    while cursor >= earliest {
        match classify(days, policy, cursor) {
            DayKind::Counts => run += 1,
            DayKind::Neutral | DayKind::ToleratedSkip => {}
            DayKind::Miss => {
                if !budget.try_spend(cursor, policy.max_misses_per_week) {
                    break;
                }
            }
        }
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }

    run
}

/// Scan the whole log oldest-first and keep the best run
fn longest_run(
    days: &BTreeMap<NaiveDate, EventStatus>,
    policy: &StreakPolicy,
    earliest: NaiveDate,
    last_completed: NaiveDate,
) -> u32 {
    let mut best = 0;
    let mut run = 0;
    let mut budget = MissBudget::default();

    for date in earliest.iter_days().take_while(|d| *d <= last_completed) {
        match classify(days, policy, date) {
            DayKind::Counts => {
                run += 1;
                best = best.max(run);
            }
            DayKind::Neutral | DayKind::ToleratedSkip => {}
            // Misses before the first completion of a run have nothing to break
            DayKind::Miss if run == 0 => {}
            DayKind::Miss => {
                if !budget.try_spend(date, policy.max_misses_per_week) {
                    run = 0;
                    budget.reset();
                }
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ev(d: NaiveDate, status: EventStatus) -> HabitEvent {
        HabitEvent::new("h1", d, status)
    }

    fn completed_run(end: NaiveDate, k: i64) -> Vec<HabitEvent> {
        (0..k)
            .map(|i| ev(end - chrono::Duration::days(i), EventStatus::Completed))
            .collect()
    }

    #[test]
    fn test_empty_log() {
        assert_eq!(
            compute_streak(&[], date(2024, 1, 4)),
            StreakSummary {
                current: 0,
                longest: 0,
                last_completed: None
            }
        );
    }

    #[test]
    fn test_gap_breaks_current_but_not_longest() {
        let events = vec![
            ev(date(2024, 1, 1), EventStatus::Completed),
            ev(date(2024, 1, 2), EventStatus::Completed),
            ev(date(2024, 1, 3), EventStatus::Missed),
            ev(date(2024, 1, 4), EventStatus::Completed),
        ];
        let s = compute_streak(&events, date(2024, 1, 4));
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 2);
        assert_eq!(s.last_completed, Some(date(2024, 1, 4)));
    }

    #[test]
    fn test_unbroken_run_ending_today() {
        for k in 1..10 {
            let s = compute_streak(&completed_run(date(2024, 3, 10), k), date(2024, 3, 10));
            assert_eq!(s.current as i64, k);
            assert_eq!(s.longest as i64, k);
        }
    }

    #[test]
    fn test_today_not_yet_logged_keeps_streak() {
        let events = completed_run(date(2024, 3, 9), 3);
        let s = compute_streak(&events, date(2024, 3, 10));
        assert_eq!(s.current, 3);

        // A miss logged today is not final yet either
        let mut with_miss = events.clone();
        with_miss.push(ev(date(2024, 3, 10), EventStatus::Missed));
        assert_eq!(compute_streak(&with_miss, date(2024, 3, 10)).current, 3);
    }

    #[test]
    fn test_streak_lapsed_after_full_missing_day() {
        let events = completed_run(date(2024, 3, 8), 3);
        let s = compute_streak(&events, date(2024, 3, 10));
        assert_eq!(s.current, 0);
        assert_eq!(s.longest, 3);
    }

    #[test]
    fn test_longest_is_global_maximum() {
        // Best run sits in the middle of the log, after an earlier short run
        let mut events = completed_run(date(2024, 1, 2), 2);
        events.extend(completed_run(date(2024, 1, 10), 5));
        events.extend(completed_run(date(2024, 1, 20), 3));
        let s = compute_streak(&events, date(2024, 1, 20));
        assert_eq!(s.current, 3);
        assert_eq!(s.longest, 5);
    }

    #[test]
    fn test_future_events_ignored() {
        let mut events = completed_run(date(2024, 1, 5), 2);
        events.extend(completed_run(date(2024, 1, 20), 10));
        let s = compute_streak(&events, date(2024, 1, 5));
        assert_eq!(s.current, 2);
        assert_eq!(s.longest, 2);
    }

    #[test]
    fn test_skip_requires_allowance() {
        let events = vec![
            ev(date(2024, 1, 1), EventStatus::Completed),
            ev(date(2024, 1, 2), EventStatus::Skipped),
            ev(date(2024, 1, 3), EventStatus::Completed),
        ];

        let strict = StreakEngine::compute(&events, date(2024, 1, 3), &StreakPolicy::default());
        assert_eq!(strict.current, 1);

        let lenient = StreakPolicy {
            allow_skips: true,
            ..Default::default()
        };
        let s = StreakEngine::compute(&events, date(2024, 1, 3), &lenient);
        // The skipped day bridges the run but does not count
        assert_eq!(s.current, 2);
        assert_eq!(s.longest, 2);
    }

    #[test]
    fn test_weekly_miss_allowance() {
        // Mon 2024-01-08 .. Sun 2024-01-14, misses on Tue and Thu
        let events = vec![
            ev(date(2024, 1, 8), EventStatus::Completed),
            ev(date(2024, 1, 9), EventStatus::Missed),
            ev(date(2024, 1, 10), EventStatus::Completed),
            ev(date(2024, 1, 11), EventStatus::Missed),
            ev(date(2024, 1, 12), EventStatus::Completed),
        ];

        let one = StreakPolicy {
            max_misses_per_week: 1,
            ..Default::default()
        };
        let s = StreakEngine::compute(&events, date(2024, 1, 12), &one);
        assert_eq!(s.current, 2);
        assert_eq!(s.longest, 2);

        let two = StreakPolicy {
            max_misses_per_week: 2,
            ..Default::default()
        };
        let s = StreakEngine::compute(&events, date(2024, 1, 12), &two);
        assert_eq!(s.current, 3);
        assert_eq!(s.longest, 3);
    }

    #[test]
    fn test_miss_allowance_resets_each_week() {
        // Sun 2024-01-07 missed, Mon 2024-01-08 missed: different ISO weeks
        let events = vec![
            ev(date(2024, 1, 6), EventStatus::Completed),
            ev(date(2024, 1, 7), EventStatus::Missed),
            ev(date(2024, 1, 8), EventStatus::Missed),
            ev(date(2024, 1, 9), EventStatus::Completed),
        ];
        let policy = StreakPolicy {
            max_misses_per_week: 1,
            ..Default::default()
        };
        assert_eq!(StreakEngine::compute(&events, date(2024, 1, 9), &policy).current, 2);
    }

    #[test]
    fn test_unscheduled_days_are_neutral() {
        // Weekdays only; Fri 2024-01-05 and Mon 2024-01-08 completed
        let events = vec![
            ev(date(2024, 1, 4), EventStatus::Completed),
            ev(date(2024, 1, 5), EventStatus::Completed),
            ev(date(2024, 1, 8), EventStatus::Completed),
        ];
        let policy = StreakPolicy {
            scheduled_days: vec![1, 2, 3, 4, 5],
            ..Default::default()
        };
        let s = StreakEngine::compute(&events, date(2024, 1, 8), &policy);
        assert_eq!(s.current, 3);
        assert_eq!(s.longest, 3);

        assert_eq!(compute_streak(&events, date(2024, 1, 8)).current, 1);
    }

    #[test]
    fn test_longest_never_below_current() {
        let patterns: Vec<Vec<EventStatus>> = vec![
            vec![EventStatus::Completed, EventStatus::Missed, EventStatus::Completed],
            vec![EventStatus::Skipped, EventStatus::Completed, EventStatus::Completed],
            vec![
                EventStatus::Completed,
                EventStatus::Missed,
                EventStatus::Missed,
                EventStatus::Completed,
                EventStatus::Missed,
                EventStatus::Completed,
            ],
        ];
        let policies = [
            StreakPolicy::default(),
            StreakPolicy {
                allow_skips: true,
                max_misses_per_week: 1,
                ..Default::default()
            },
        ];

        for pattern in &patterns {
            let events: Vec<HabitEvent> = pattern
                .iter()
                .enumerate()
                .map(|(i, s)| ev(date(2024, 2, 1) + chrono::Duration::days(i as i64), *s))
                .collect();
            let as_of = events.last().unwrap().date;
            for policy in &policies {
                let s = StreakEngine::compute(&events, as_of, policy);
                assert!(s.longest >= s.current, "{pattern:?} {policy:?} -> {s:?}");
            }
        }
    }

    #[test]
    fn test_for_habit_uses_policy() {
        let mut habit = Habit::new("h1", "u1", "Stretch");
        habit.allow_skips = true;
        let log = EventLog::from_events(vec![
            ev(date(2024, 1, 1), EventStatus::Completed),
            ev(date(2024, 1, 2), EventStatus::Skipped),
            ev(date(2024, 1, 3), EventStatus::Completed),
            HabitEvent::new("other", date(2024, 1, 3), EventStatus::Completed),
        ]);
        assert_eq!(StreakEngine::for_habit(&habit, &log, date(2024, 1, 3)).current, 2);
        assert_eq!(StreakEngine::max_longest(&[habit], &log, date(2024, 1, 3)), 2);
    }
}
