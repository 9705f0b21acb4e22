//! Badge evaluation
//!
//! Decides which badges a user newly qualifies for and applies their rewards.
//! Streak and completion rules are evaluated here; `special` rules are only
//! unlocked through predicates the caller registers per badge id.

use crate::progression::ProgressionEngine;
use crate::types::{BadgeRule, ConditionType, UnlockedBadge, UserProgress, UserStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Events that can happen while rewarding a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GamificationEvent {
    BadgeUnlocked {
        badge_id: String,
        name: String,
        earned_at: DateTime<Utc>,
    },
    XpAwarded {
        amount: u64,
        reason: String,
    },
    LevelUp {
        old_level: u32,
        new_level: u32,
    },
    CoinsCredited {
        amount: u64,
        reason: String,
    },
}

/// Caller-supplied predicate for a `special` badge rule
pub trait SpecialCondition: Send + Sync {
    fn is_met(&self, rule: &BadgeRule, stats: &UserStats) -> bool;
}

impl<F> SpecialCondition for F
where
    F: Fn(&BadgeRule, &UserStats) -> bool + Send + Sync,
{
    fn is_met(&self, rule: &BadgeRule, stats: &UserStats) -> bool {
        self(rule, stats)
    }
}

/// Registry of special predicates keyed by badge id
#[derive(Default)]
pub struct SpecialConditions {
    by_badge: HashMap<String, Box<dyn SpecialCondition>>,
}

impl SpecialConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the predicate deciding `badge_id`, replacing any previous one
    pub fn register(&mut self, badge_id: impl Into<String>, condition: impl SpecialCondition + 'static) {
        self.by_badge.insert(badge_id.into(), Box::new(condition));
    }

    pub fn with(mut self, badge_id: impl Into<String>, condition: impl SpecialCondition + 'static) -> Self {
        self.register(badge_id, condition);
        self
    }

    pub fn get(&self, badge_id: &str) -> Option<&dyn SpecialCondition> {
        self.by_badge.get(badge_id).map(|c| c.as_ref())
    }
}

impl std::fmt::Debug for SpecialConditions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialConditions")
            .field("badges", &self.by_badge.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of one evaluation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeEvaluation {
    /// Newly unlocked rules, in rule-list order
    pub unlocked: Vec<BadgeRule>,
    /// Records the caller must persist before the next evaluation
    pub badges: Vec<UnlockedBadge>,
    /// Progress after XP and coin rewards
    pub progress: UserProgress,
    pub events: Vec<GamificationEvent>,
}

/// Badge engine
#[derive(Debug, Default)]
pub struct BadgeEngine {
    progression: ProgressionEngine,
    specials: SpecialConditions,
}

impl BadgeEngine {
    pub fn new(progression: ProgressionEngine) -> Self {
        Self {
            progression,
            specials: SpecialConditions::default(),
        }
    }

    pub fn with_specials(mut self, specials: SpecialConditions) -> Self {
        self.specials = specials;
        self
    }

    /// Whether `stats` satisfy `rule`, ignoring whether it was already earned
    pub fn is_eligible(&self, rule: &BadgeRule, stats: &UserStats) -> bool {
        match rule.condition_type {
            ConditionType::Streak => stats.max_streak_across_habits >= rule.threshold,
            ConditionType::Completion => stats.total_completions >= u64::from(rule.threshold),
            ConditionType::Special => self
                .specials
                .get(&rule.id)
                .is_some_and(|c| c.is_met(rule, stats)),
        }
    }

    /// Unlock every qualifying rule not in `already_earned`.
    ///
    /// Rules are visited in list order. Each unlock awards `xp_reward` through
    /// the progression engine and credits `coin_reward` straight to coins.
    /// The caller persists `badges` so the next call sees them as earned.
    pub fn evaluate(
        &self,
        user_id: &str,
        stats: &UserStats,
        rules: &[BadgeRule],
        already_earned: &HashSet<String>,
        progress: &UserProgress,
        now: DateTime<Utc>,
    ) -> BadgeEvaluation {
        let mut unlocked = Vec::new();
        let mut badges = Vec::new();
        let mut events = Vec::new();
        let mut progress = progress.clone();
        let mut seen: HashSet<&str> = HashSet::new();

        for rule in rules {
            if already_earned.contains(&rule.id) || !seen.insert(rule.id.as_str()) {
                continue;
            }
            if !self.is_eligible(rule, stats) {
                continue;
            }

            info!(user_id, badge_id = %rule.id, "badge unlocked");
            events.push(GamificationEvent::BadgeUnlocked {
                badge_id: rule.id.clone(),
                name: rule.name.clone(),
                earned_at: now,
            });

            if rule.xp_reward > 0 {
                let award = self
                    .progression
                    .award_xp(&progress, u64::from(rule.xp_reward));
                events.push(GamificationEvent::XpAwarded {
                    amount: u64::from(rule.xp_reward),
                    reason: format!("Badge earned: {}", rule.name),
                });
                if let Some(level_up) = award.level_up {
                    events.push(GamificationEvent::LevelUp {
                        old_level: level_up.old_level,
                        new_level: level_up.new_level,
                    });
                }
                progress = award.progress;
            }

            if rule.coin_reward > 0 {
                progress.coins = progress.coins.saturating_add(u64::from(rule.coin_reward));
                events.push(GamificationEvent::CoinsCredited {
                    amount: u64::from(rule.coin_reward),
                    reason: format!("Badge earned: {}", rule.name),
                });
            }

            badges.push(UnlockedBadge {
                user_id: user_id.to_string(),
                badge_id: rule.id.clone(),
                earned_at: now,
            });
            unlocked.push(rule.clone());
        }

        BadgeEvaluation {
            unlocked,
            badges,
            progress,
            events,
        }
    }
}

/// The stock badge set
pub fn default_badge_rules() -> Vec<BadgeRule> {
    let rule = |id: &str,
                name: &str,
                description: &str,
                condition_type: ConditionType,
                threshold: u32,
                xp: u32,
                coins: u32| BadgeRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        condition_type,
        threshold,
        xp_reward: xp,
        coin_reward: coins,
    };

    vec![
        rule("first_step", "First Step", "Complete your first habit", ConditionType::Completion, 1, 10, 5),
        rule("week_warrior", "Week Warrior", "7-day streak", ConditionType::Streak, 7, 50, 25),
        rule("habit_master", "Habit Master", "30-day streak", ConditionType::Streak, 30, 200, 100),
        rule(
            "consistency_king",
            "Consistency King",
            "100 habit completions",
            ConditionType::Completion,
            100,
            150,
            75,
        ),
        rule(
            "early_bird",
            "Early Bird",
            "Complete habits before 7 AM for 5 days",
            ConditionType::Special,
            5,
            75,
            40,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn stats(streak: u32, completions: u64) -> UserStats {
        UserStats {
            max_streak_across_habits: streak,
            total_completions: completions,
            active_habits: 1,
        }
    }

    fn ids(rules: &[BadgeRule]) -> Vec<&str> {
        rules.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_first_completion_unlocks_first_step() {
        let engine = BadgeEngine::default();
        let eval = engine.evaluate(
            "u1",
            &stats(1, 1),
            &default_badge_rules(),
            &HashSet::new(),
            &UserProgress::new("u1"),
            now(),
        );

        assert_eq!(ids(&eval.unlocked), vec!["first_step"]);
        assert_eq!(eval.progress.xp, 10);
        assert_eq!(eval.progress.coins, 5);
        assert_eq!(eval.badges.len(), 1);
        assert_eq!(eval.badges[0].badge_id, "first_step");
        assert_eq!(eval.badges[0].earned_at, now());
    }

    #[test]
    fn test_rule_order_and_rewards() {
        let engine = BadgeEngine::default();
        let eval = engine.evaluate(
            "u1",
            &stats(30, 150),
            &default_badge_rules(),
            &HashSet::new(),
            &UserProgress::new("u1"),
            now(),
        );

        assert_eq!(
            ids(&eval.unlocked),
            vec!["first_step", "week_warrior", "habit_master", "consistency_king"]
        );
        // 10 + 50 + 200 + 150 = 410 XP -> level 3 (thresholds 100, 300)
        assert_eq!(eval.progress.xp, 410);
        assert_eq!(eval.progress.level, 3);

        // XP runs 10 -> 60 -> 260 (level 2) -> 410 (level 3), so two
        // level-up bonuses on top of 5 + 25 + 100 + 75 badge coins
        let level_ups = eval
            .events
            .iter()
            .filter(|e| matches!(e, GamificationEvent::LevelUp { .. }))
            .count() as u64;
        assert_eq!(level_ups, 2);
        assert_eq!(eval.progress.coins, 205 + 50 * level_ups);
    }

    #[test]
    fn test_idempotent_with_persisted_earned_set() {
        let engine = BadgeEngine::default();
        let rules = default_badge_rules();
        let first = engine.evaluate(
            "u1",
            &stats(7, 5),
            &rules,
            &HashSet::new(),
            &UserProgress::new("u1"),
            now(),
        );
        assert_eq!(ids(&first.unlocked), vec!["first_step", "week_warrior"]);

        let earned: HashSet<String> = first.badges.iter().map(|b| b.badge_id.clone()).collect();
        let second = engine.evaluate("u1", &stats(7, 5), &rules, &earned, &first.progress, now());
        assert!(second.unlocked.is_empty());
        assert!(second.events.is_empty());
        assert_eq!(second.progress, first.progress);
    }

    #[test]
    fn test_duplicate_rule_ids_unlock_once() {
        let mut rules = default_badge_rules();
        rules.push(rules[0].clone());
        let eval = BadgeEngine::default().evaluate(
            "u1",
            &stats(0, 1),
            &rules,
            &HashSet::new(),
            &UserProgress::new("u1"),
            now(),
        );
        assert_eq!(ids(&eval.unlocked), vec!["first_step"]);
    }

    #[test]
    fn test_special_requires_registered_predicate() {
        let rules = default_badge_rules();
        let early_bird = &rules[4];
        assert_eq!(early_bird.condition_type, ConditionType::Special);

        let plain = BadgeEngine::default();
        assert!(!plain.is_eligible(early_bird, &stats(100, 1000)));

        let specials =
            SpecialConditions::new().with("early_bird", |rule: &BadgeRule, s: &UserStats| {
                s.active_habits >= rule.threshold
            });
        let engine = BadgeEngine::default().with_specials(specials);
        let mut s = stats(0, 0);
        assert!(!engine.is_eligible(early_bird, &s));
        s.active_habits = 5;
        assert!(engine.is_eligible(early_bird, &s));

        let eval = engine.evaluate(
            "u1",
            &s,
            &rules,
            &HashSet::new(),
            &UserProgress::new("u1"),
            now(),
        );
        assert_eq!(ids(&eval.unlocked), vec!["early_bird"]);
        assert_eq!(eval.progress.coins, 40);
    }

    #[test]
    fn test_events_serialize_tagged() {
        let event = GamificationEvent::XpAwarded {
            amount: 10,
            reason: "Habit completed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "xp_awarded");
        assert_eq!(json["amount"], 10);
    }
}
