//! Window analytics
//!
//! Derives daily, weekly and monthly rollups, a window summary and per-habit
//! stats from the same event log the streak engine reads.

use crate::schema::EventLog;
use crate::streak::StreakEngine;
use crate::types::{
    weekday_name, AnalyticsReport, DailyRollup, DateWindow, EventStatus, Habit, HabitDayDetail,
    HabitEvent, HabitWindowStats, PeriodRollup, WindowSummary,
};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Analytics aggregator
pub struct AnalyticsAggregator;

impl AnalyticsAggregator {
    /// Aggregate `events` for `habits` over `window`.
    ///
    /// Only events belonging to one of `habits` are considered, and a later
    /// event for the same habit and day replaces an earlier one. Streaks look
    /// at the full history up to `window.end`; every other figure is limited
    /// to the window.
    pub fn aggregate(habits: &[Habit], events: &[HabitEvent], window: DateWindow) -> AnalyticsReport {
        let names: HashMap<&str, &str> = habits
            .iter()
            .map(|h| (h.id.as_str(), h.name.as_str()))
            .collect();

        let log = EventLog::from_events(
            events
                .iter()
                .filter(|e| names.contains_key(e.habit_id.as_str()))
                .cloned(),
        );
        let in_window = log.events_in(&window);

        let habit_count = u32::try_from(habits.len()).unwrap_or(u32::MAX);
        let daily = daily_rollups(&in_window, &names, window);
        let weekly = period_rollups(&daily, habit_count, |d| {
            let week = d.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        });
        let monthly = period_rollups(&daily, habit_count, |d| {
            format!("{}-{:02}", d.year(), d.month())
        });
        let summary = summarize(&daily, habit_count, window);
        let habit_stats = habits
            .iter()
            .map(|h| habit_window_stats(h, &log, &in_window, window))
            .collect();

        debug!(
            habits = habit_count,
            days = summary.window_days,
            completed = summary.completed,
            "aggregated analytics"
        );

        AnalyticsReport {
            window,
            daily,
            weekly,
            monthly,
            summary,
            habits: habit_stats,
        }
    }
}

/// Percentage of `numerator` over `habits * days` slots, 0 when there are none
fn rate(numerator: u32, habits: u32, days: u32) -> f64 {
    let slots = u64::from(habits) * u64::from(days);
    if slots == 0 {
        return 0.0;
    }
    f64::from(numerator) / slots as f64 * 100.0
}

fn daily_rollups(
    events: &[HabitEvent],
    names: &HashMap<&str, &str>,
    window: DateWindow,
) -> Vec<DailyRollup> {
    let mut by_date: BTreeMap<NaiveDate, DailyRollup> = window
        .dates()
        .map(|date| {
            (
                date,
                DailyRollup {
                    date,
                    completed: 0,
                    skipped: 0,
                    missed: 0,
                    habits: Vec::new(),
                },
            )
        })
        .collect();

    for event in events {
        let Some(day) = by_date.get_mut(&event.date) else {
            continue;
        };
        match event.status {
            EventStatus::Completed => day.completed += 1,
            EventStatus::Skipped => day.skipped += 1,
            EventStatus::Missed => day.missed += 1,
        }
        day.habits.push(HabitDayDetail {
            habit_id: event.habit_id.clone(),
            habit_name: names.get(event.habit_id.as_str()).map(|n| n.to_string()),
            status: event.status,
            value: event.value,
            mood: event.mood,
            duration_minutes: event.duration_minutes,
            notes: event.notes.clone(),
        });
    }

    by_date.into_values().collect()
}

fn period_rollups<F>(daily: &[DailyRollup], habit_count: u32, label_of: F) -> Vec<PeriodRollup>
where
    F: Fn(NaiveDate) -> String,
{
    let mut periods: Vec<PeriodRollup> = Vec::new();

    // Daily rollups are date-ordered, so each period is a contiguous slice
    for day in daily {
        let label = label_of(day.date);
        match periods.last_mut() {
            Some(period) if period.label == label => {
                period.end = day.date;
                period.days += 1;
                period.completed += day.completed;
                period.skipped += day.skipped;
                period.missed += day.missed;
            }
            _ => periods.push(PeriodRollup {
                label,
                start: day.date,
                end: day.date,
                days: 1,
                completed: day.completed,
                skipped: day.skipped,
                missed: day.missed,
                completion_rate: 0.0,
            }),
        }
    }

    for period in &mut periods {
        period.completion_rate = rate(period.completed, habit_count, period.days);
    }
    periods
}

fn summarize(daily: &[DailyRollup], habit_count: u32, window: DateWindow) -> WindowSummary {
    let window_days = window.days();
    let completed: u32 = daily.iter().map(|d| d.completed).sum();
    let skipped: u32 = daily.iter().map(|d| d.skipped).sum();
    let missed: u32 = daily.iter().map(|d| d.missed).sum();

    let end_day_completed = daily
        .last()
        .filter(|d| d.date == window.end)
        .map(|d| d.completed)
        .unwrap_or(0);

    WindowSummary {
        habit_count,
        window_days,
        completed,
        skipped,
        missed,
        completion_rate: rate(completed, habit_count, window_days),
        end_day_completion_rate: rate(end_day_completed, habit_count, 1),
        best_day_of_week: best_day_of_week(daily),
    }
}

/// Weekday with the most completions; ties go to the earlier weekday
fn best_day_of_week(daily: &[DailyRollup]) -> Option<String> {
    let mut totals = [0u32; 7];
    for day in daily {
        totals[day.date.weekday().num_days_from_monday() as usize] += day.completed;
    }

    let mut best: Option<(Weekday, u32)> = None;
    for (weekday, total) in WEEKDAYS.iter().zip(totals) {
        if total == 0 {
            continue;
        }
        if best.map_or(true, |(_, top)| total > top) {
            best = Some((*weekday, total));
        }
    }

    best.map(|(weekday, _)| weekday_name(weekday).to_string())
}

fn habit_window_stats(
    habit: &Habit,
    log: &EventLog,
    in_window: &[HabitEvent],
    window: DateWindow,
) -> HabitWindowStats {
    let streak = StreakEngine::for_habit(habit, log, window.end);
    let events: Vec<&HabitEvent> = in_window.iter().filter(|e| e.habit_id == habit.id).collect();

    let moods: Vec<f64> = events
        .iter()
        .filter_map(|e| e.mood)
        .map(f64::from)
        .collect();
    let average_mood = if moods.is_empty() {
        None
    } else {
        Some(moods.iter().sum::<f64>() / moods.len() as f64)
    };

    HabitWindowStats {
        habit_id: habit.id.clone(),
        name: habit.name.clone(),
        current_streak: streak.current,
        longest_streak: streak.longest,
        completions: events.iter().filter(|e| e.is_completed()).count() as u32,
        total_value: events.iter().filter_map(|e| e.value).sum(),
        unit: habit.unit.clone(),
        average_mood,
        total_duration_minutes: events
            .iter()
            .filter_map(|e| e.duration_minutes)
            .map(u64::from)
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn done(habit: &str, d: NaiveDate) -> HabitEvent {
        HabitEvent::new(habit, d, EventStatus::Completed)
    }

    fn two_habits() -> Vec<Habit> {
        vec![
            Habit::new("h1", "u1", "Read"),
            Habit::new("h2", "u1", "Run"),
        ]
    }

    #[test]
    fn test_half_completion_rate() {
        // Mon 2024-01-01 .. Sun 2024-01-07, h1 done every day, h2 never
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 7));
        let events: Vec<HabitEvent> = window.dates().map(|d| done("h1", d)).collect();

        let report = AnalyticsAggregator::aggregate(&two_habits(), &events, window);
        assert_eq!(report.summary.completed, 7);
        assert!((report.summary.completion_rate - 50.0).abs() < 1e-9);
        assert!((report.summary.end_day_completion_rate - 50.0).abs() < 1e-9);
        assert_eq!(report.daily.len(), 7);
        assert_eq!(report.habits[0].current_streak, 7);
        assert_eq!(report.habits[1].completions, 0);
    }

    #[test]
    fn test_zero_guards() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 7));
        let report = AnalyticsAggregator::aggregate(&[], &[done("h1", date(2024, 1, 2))], window);
        assert_eq!(report.summary.completion_rate, 0.0);
        assert_eq!(report.summary.end_day_completion_rate, 0.0);
        assert_eq!(report.summary.completed, 0);
        assert_eq!(report.summary.best_day_of_week, None);

        let inverted = DateWindow::new(date(2024, 1, 7), date(2024, 1, 1));
        let report = AnalyticsAggregator::aggregate(&two_habits(), &[], inverted);
        assert_eq!(report.summary.window_days, 0);
        assert_eq!(report.summary.completion_rate, 0.0);
        assert!(report.daily.is_empty());
        assert!(report.weekly.is_empty());
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let window = DateWindow::new(date(2024, 1, 2), date(2024, 1, 3));
        let events = vec![
            done("h1", date(2024, 1, 1)),
            done("h1", date(2024, 1, 2)),
            done("h1", date(2024, 1, 4)),
        ];
        let report = AnalyticsAggregator::aggregate(&two_habits(), &events, window);
        assert_eq!(report.summary.completed, 1);
        // History before the window still feeds the streak
        assert_eq!(report.habits[0].longest_streak, 2);
    }

    #[test]
    fn test_best_day_tie_goes_to_earlier_weekday() {
        // Wed 2024-01-03 and Mon 2024-01-01 each have one completion
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 7));
        let events = vec![done("h1", date(2024, 1, 3)), done("h1", date(2024, 1, 1))];
        let report = AnalyticsAggregator::aggregate(&two_habits(), &events, window);
        assert_eq!(report.summary.best_day_of_week.as_deref(), Some("Monday"));

        let events = vec![
            done("h1", date(2024, 1, 3)),
            done("h2", date(2024, 1, 3)),
            done("h1", date(2024, 1, 1)),
        ];
        let report = AnalyticsAggregator::aggregate(&two_habits(), &events, window);
        assert_eq!(report.summary.best_day_of_week.as_deref(), Some("Wednesday"));
    }

    #[test]
    fn test_daily_detail_and_upsert() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 1));
        let mut first = HabitEvent::new("h1", date(2024, 1, 1), EventStatus::Missed);
        first.notes = Some("tired".to_string());
        let mut second = done("h1", date(2024, 1, 1));
        second.mood = Some(4);
        second.value = Some(2.5);

        let report = AnalyticsAggregator::aggregate(&two_habits(), &[first, second], window);
        let day = &report.daily[0];
        assert_eq!((day.completed, day.skipped, day.missed), (1, 0, 0));
        assert_eq!(day.habits.len(), 1);
        assert_eq!(day.habits[0].habit_name.as_deref(), Some("Read"));
        assert_eq!(day.habits[0].mood, Some(4));
        assert_eq!(report.habits[0].average_mood, Some(4.0));
        assert_eq!(report.habits[0].total_value, 2.5);
    }

    #[test]
    fn test_weekly_and_monthly_rollups() {
        // Fri 2024-01-26 .. Sun 2024-02-04 spans two ISO weeks and two months
        let window = DateWindow::new(date(2024, 1, 26), date(2024, 2, 4));
        let events: Vec<HabitEvent> = window.dates().map(|d| done("h1", d)).collect();
        let report = AnalyticsAggregator::aggregate(&two_habits(), &events, window);

        let weeks: Vec<(&str, u32)> = report
            .weekly
            .iter()
            .map(|p| (p.label.as_str(), p.days))
            .collect();
        assert_eq!(weeks, vec![("2024-W04", 3), ("2024-W05", 7)]);

        let months: Vec<(&str, u32, u32)> = report
            .monthly
            .iter()
            .map(|p| (p.label.as_str(), p.days, p.completed))
            .collect();
        assert_eq!(months, vec![("2024-01", 6, 6), ("2024-02", 4, 4)]);
        assert!((report.monthly[1].completion_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_with_many_habits_over_long_window() {
        // 66,000 habits over 66,000 days is more slots than fit in a u32
        let habits: Vec<Habit> = (0..66_000)
            .map(|i| Habit::new(format!("h{i}"), "u1", "Habit"))
            .collect();
        let window = DateWindow::ending_on(date(2024, 1, 1), 66_000);
        let report =
            AnalyticsAggregator::aggregate(&habits, &[done("h0", date(2024, 1, 1))], window);

        assert_eq!(report.summary.window_days, 66_000);
        assert_eq!(report.summary.completed, 1);
        let expected = 100.0 / (66_000.0 * 66_000.0);
        assert!((report.summary.completion_rate - expected).abs() < 1e-15);
        assert!((report.summary.end_day_completion_rate - 100.0 / 66_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_habit_events_dropped() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 1));
        let report = AnalyticsAggregator::aggregate(
            &two_habits(),
            &[done("ghost", date(2024, 1, 1))],
            window,
        );
        assert_eq!(report.summary.completed, 0);
        assert!(report.daily[0].habits.is_empty());
    }
}
