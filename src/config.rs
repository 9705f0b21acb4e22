//! Engine configuration
//!
//! Tunables for rewards and progression. Every field has a default, so an
//! empty TOML document (or no file at all) yields the stock behaviour.
//!
//! ```toml
//! [progression]
//! level_step_xp = 100
//! level_up_coin_bonus = 50
//!
//! [rewards]
//! xp_per_completion = 10
//! xp_per_habit_created = 5
//!
//! [analytics]
//! default_window_days = 7
//! ```

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub progression: ProgressionConfig,
    pub rewards: RewardConfig,
    pub analytics: AnalyticsConfig,
}

/// Level curve settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Leaving level `n` costs `n * level_step_xp`
    pub level_step_xp: u64,
    /// Coins per award call that raises the level
    pub level_up_coin_bonus: u64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            level_step_xp: crate::progression::DEFAULT_LEVEL_STEP_XP,
            level_up_coin_bonus: crate::progression::DEFAULT_LEVEL_UP_COIN_BONUS,
        }
    }
}

/// XP granted by tracker actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub xp_per_completion: u64,
    pub xp_per_habit_created: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            xp_per_completion: 10,
            xp_per_habit_created: 5,
        }
    }
}

/// Analytics defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Window length used when the caller gives only an end date
    pub default_window_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_window_days: 7,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::EncodingError(e.to_string()))
    }
}
