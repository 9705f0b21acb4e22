//! XP and level progression
//!
//! Levels follow a triangular curve: leaving level `n` costs `n * step` XP,
//! so with the default step of 100 the thresholds are 0, 100, 300, 600, ...
//! Level is always derived from cumulative XP, never stored on its own.

use crate::config::ProgressionConfig;
use crate::types::UserProgress;
use serde::{Deserialize, Serialize};
use tracing::info;

/// XP cost multiplier per level
pub const DEFAULT_LEVEL_STEP_XP: u64 = 100;

/// Coins granted once per award that crosses at least one level boundary
pub const DEFAULT_LEVEL_UP_COIN_BONUS: u64 = 50;

/// A level up event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
}

/// Result of awarding XP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAward {
    pub progress: UserProgress,
    pub level_up: Option<LevelUp>,
    /// Coins granted by this award (level-up bonus only)
    pub coins_awarded: u64,
}

/// Where a user stands inside their current level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub xp: u64,
    /// Cumulative XP at which the current level starts
    pub current_level_xp: u64,
    /// Cumulative XP at which the next level starts
    pub next_level_xp: u64,
    pub xp_into_level: u64,
    pub xp_to_next_level: u64,
    /// Percentage through the current level, 0-100
    pub progress_pct: f64,
}

/// Progression engine
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    level_step_xp: u64,
    level_up_coin_bonus: u64,
}

impl Default for ProgressionEngine {
    fn default() -> Self {
        Self::new(&ProgressionConfig::default())
    }
}

impl ProgressionEngine {
    pub fn new(config: &ProgressionConfig) -> Self {
        Self {
            // A zero step would make every level free
            level_step_xp: config.level_step_xp.max(1),
            level_up_coin_bonus: config.level_up_coin_bonus,
        }
    }

    /// Level reached with `xp` cumulative XP
    pub fn level_for_xp(&self, xp: u64) -> u32 {
        // Largest n with n * (n - 1) / 2 <= xp / step
        let budget = u128::from(xp / self.level_step_xp);
        let mut n = ((1.0 + (1.0 + 8.0 * budget as f64).sqrt()) / 2.0) as u128;
        while n > 1 && n * (n - 1) / 2 > budget {
            n -= 1;
        }
        while (n + 1) * n / 2 <= budget {
            n += 1;
        }
        u32::try_from(n.max(1)).unwrap_or(u32::MAX)
    }

    /// Cumulative XP at which `level` begins, clamped to `u64::MAX`
    pub fn xp_for_level(&self, level: u32) -> u64 {
        let n = u128::from(level.max(1)) - 1;
        let xp = u128::from(self.level_step_xp) * (n * (n + 1) / 2);
        u64::try_from(xp).unwrap_or(u64::MAX)
    }

    /// XP needed to leave `level`
    fn level_cost(&self, level: u32) -> u64 {
        u64::from(level).saturating_mul(self.level_step_xp)
    }

    /// Add `amount` XP and recompute the level.
    ///
    /// When the level rises the configured coin bonus is granted once for the
    /// call, however many levels were crossed. A zero amount changes nothing.
    pub fn award_xp(&self, progress: &UserProgress, amount: u64) -> XpAward {
        let xp = progress.xp.saturating_add(amount);
        let new_level = self.level_for_xp(xp).max(progress.level);

        let mut updated = UserProgress {
            xp,
            level: new_level,
            ..progress.clone()
        };

        if new_level > progress.level {
            updated.coins = updated.coins.saturating_add(self.level_up_coin_bonus);
            info!(
                user_id = %progress.user_id,
                old_level = progress.level,
                new_level,
                "level up"
            );
            return XpAward {
                progress: updated,
                level_up: Some(LevelUp {
                    old_level: progress.level,
                    new_level,
                }),
                coins_awarded: self.level_up_coin_bonus,
            };
        }

        XpAward {
            progress: updated,
            level_up: None,
            coins_awarded: 0,
        }
    }

    /// Progress through the level that `xp` falls in
    pub fn level_progress(&self, xp: u64) -> LevelProgress {
        let level = self.level_for_xp(xp);
        let current_level_xp = self.xp_for_level(level);
        let level_cost = self.level_cost(level);
        let next_level_xp = current_level_xp.saturating_add(level_cost);
        let xp_into_level = xp.saturating_sub(current_level_xp);

        LevelProgress {
            level,
            xp,
            current_level_xp,
            next_level_xp,
            xp_into_level,
            xp_to_next_level: next_level_xp.saturating_sub(xp),
            progress_pct: (xp_into_level as f64 / level_cost as f64 * 100.0).min(100.0),
        }
    }
}

/// Level for `xp` on the default curve
pub fn level_for_xp(xp: u64) -> u32 {
    ProgressionEngine::default().level_for_xp(xp)
}

/// Award XP on the default curve
pub fn award_xp(progress: &UserProgress, amount: u64) -> XpAward {
    ProgressionEngine::default().award_xp(progress, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_for_xp() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(299), 2);
        assert_eq!(level_for_xp(300), 3);
        assert_eq!(level_for_xp(600), 4);
        assert_eq!(level_for_xp(1000), 5);
    }

    #[test]
    fn test_xp_for_level_matches_curve() {
        let engine = ProgressionEngine::default();
        for level in 1..20 {
            let start = engine.xp_for_level(level);
            assert_eq!(engine.level_for_xp(start), level);
            if start > 0 {
                assert_eq!(engine.level_for_xp(start - 1), level - 1);
            }
        }
    }

    #[test]
    fn test_award_without_level_up() {
        let award = award_xp(&UserProgress::new("u1"), 10);
        assert_eq!(award.progress.xp, 10);
        assert_eq!(award.progress.level, 1);
        assert_eq!(award.progress.coins, 0);
        assert_eq!(award.level_up, None);
    }

    #[test]
    fn test_level_up_grants_bonus_once() {
        // 0 -> 650 XP crosses levels 2, 3 and 4 in one call
        let award = award_xp(&UserProgress::new("u1"), 650);
        assert_eq!(award.progress.level, 4);
        assert_eq!(award.progress.coins, DEFAULT_LEVEL_UP_COIN_BONUS);
        assert_eq!(award.coins_awarded, DEFAULT_LEVEL_UP_COIN_BONUS);
        assert_eq!(
            award.level_up,
            Some(LevelUp {
                old_level: 1,
                new_level: 4
            })
        );
    }

    #[test]
    fn test_award_is_monotonic() {
        let engine = ProgressionEngine::default();
        let mut progress = UserProgress::new("u1");
        for amount in [0, 5, 10, 95, 1, 250, 0, 1000] {
            let next = engine.award_xp(&progress, amount).progress;
            assert!(next.xp >= progress.xp);
            assert!(next.level >= progress.level);
            assert_eq!(next.level, engine.level_for_xp(next.xp));
            progress = next;
        }
    }

    #[test]
    fn test_level_progress() {
        let p = ProgressionEngine::default().level_progress(150);
        assert_eq!(p.level, 2);
        assert_eq!(p.current_level_xp, 100);
        assert_eq!(p.next_level_xp, 300);
        assert_eq!(p.xp_into_level, 50);
        assert_eq!(p.xp_to_next_level, 150);
        assert!((p.progress_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_xp_stays_in_range() {
        let engine = ProgressionEngine::default();
        let p = engine.level_progress(u64::MAX);
        assert_eq!(p.level, engine.level_for_xp(u64::MAX));
        assert!(p.current_level_xp <= p.xp);
        assert!(p.next_level_xp >= p.current_level_xp);
        assert!(p.progress_pct >= 0.0 && p.progress_pct <= 100.0);
        assert_eq!(engine.level_for_xp(engine.xp_for_level(p.level)), p.level);

        let award = engine.award_xp(
            &UserProgress {
                xp: u64::MAX - 1,
                ..UserProgress::new("u1")
            },
            10,
        );
        assert_eq!(award.progress.xp, u64::MAX);
        assert_eq!(award.progress.level, p.level);
    }

    #[test]
    fn test_huge_step_saturates() {
        let engine = ProgressionEngine::new(&ProgressionConfig {
            level_step_xp: u64::MAX,
            level_up_coin_bonus: 1,
        });
        assert_eq!(engine.level_for_xp(u64::MAX - 1), 1);
        assert_eq!(engine.level_for_xp(u64::MAX), 2);
        let p = engine.level_progress(u64::MAX);
        assert_eq!(p.current_level_xp, u64::MAX);
        assert_eq!(p.next_level_xp, u64::MAX);
        assert_eq!(p.xp_to_next_level, 0);
        assert_eq!(p.progress_pct, 0.0);

        // Step of one reaches past u32 levels before u64 XP runs out
        let engine = ProgressionEngine::new(&ProgressionConfig {
            level_step_xp: 1,
            level_up_coin_bonus: 1,
        });
        assert_eq!(engine.level_for_xp(u64::MAX), u32::MAX);
        assert!(engine.level_progress(u64::MAX).progress_pct <= 100.0);
    }

    #[test]
    fn test_custom_step() {
        let engine = ProgressionEngine::new(&ProgressionConfig {
            level_step_xp: 50,
            level_up_coin_bonus: 10,
        });
        assert_eq!(engine.level_for_xp(50), 2);
        assert_eq!(engine.level_for_xp(150), 3);
        assert_eq!(engine.award_xp(&UserProgress::new("u1"), 50).progress.coins, 10);
    }
}
