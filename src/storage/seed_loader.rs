//! Quest catalog seeds.
//!
//! The catalog is re-seeded on every startup. Operators can replace the
//! built-in set with a JSON file (`storage.quest_seed_file`) without
//! recompiling; keys that disappear from the file are deactivated, not deleted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::storage::errors::StoreError;
use crate::storage::types::{QuestMetric, QuestPeriod};

/// One catalog entry as written in a seed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestSeed {
    pub key: String,
    pub title: String,
    pub period: QuestPeriod,
    pub metric: QuestMetric,
    pub target: u32,
    #[serde(default)]
    pub reward_coins: i64,
    #[serde(default)]
    pub reward_xp: u64,
}

impl QuestSeed {
    pub fn new(
        key: &str,
        title: &str,
        period: QuestPeriod,
        metric: QuestMetric,
        target: u32,
    ) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            period,
            metric,
            target: target.max(1),
            reward_coins: 0,
            reward_xp: 0,
        }
    }

    pub fn with_reward(mut self, coins: i64, xp: u64) -> Self {
        self.reward_coins = coins;
        self.reward_xp = xp;
        self
    }
}

/// The built-in catalog used when no seed file is configured.
pub fn default_quest_seeds() -> Vec<QuestSeed> {
    vec![
        QuestSeed::new("daily_checkin", "Claim your daily bonus", QuestPeriod::Daily, QuestMetric::DailyBonus, 1)
            .with_reward(50, 20),
        QuestSeed::new("weekly_checkin", "Claim your weekly bonus", QuestPeriod::Weekly, QuestMetric::WeeklyBonus, 1)
            .with_reward(150, 60),
        QuestSeed::new("monthly_regular", "Claim 20 daily bonuses", QuestPeriod::Monthly, QuestMetric::DailyBonus, 20)
            .with_reward(1000, 400),
        QuestSeed::new("first_friend", "Add your first friend", QuestPeriod::Progress, QuestMetric::Friends, 1)
            .with_reward(100, 50),
        QuestSeed::new("social_circle", "Have 5 friends", QuestPeriod::Progress, QuestMetric::Friends, 5)
            .with_reward(400, 150),
        QuestSeed::new("reach_level_5", "Reach level 5", QuestPeriod::Progress, QuestMetric::Level, 5)
            .with_reward(500, 0),
        QuestSeed::new("reach_level_10", "Reach level 10", QuestPeriod::Progress, QuestMetric::Level, 10)
            .with_reward(1500, 0),
    ]
}

/// Load a catalog from a JSON array of [`QuestSeed`] objects.
pub fn load_quest_seeds_from_json<P: AsRef<Path>>(path: P) -> Result<Vec<QuestSeed>, StoreError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let seeds: Vec<QuestSeed> = serde_json::from_str(&contents)
        .map_err(|e| StoreError::Seed(format!("failed to parse {}: {}", path.display(), e)))?;
    validate_seeds(&seeds)?;
    Ok(seeds)
}

/// Reject empty or duplicate keys and zero targets.
pub fn validate_seeds(seeds: &[QuestSeed]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for seed in seeds {
        if seed.key.trim().is_empty() {
            return Err(StoreError::Seed("quest key cannot be empty".to_string()));
        }
        if !seen.insert(seed.key.as_str()) {
            return Err(StoreError::Seed(format!("duplicate quest key '{}'", seed.key)));
        }
        if seed.target == 0 {
            return Err(StoreError::Seed(format!("quest '{}' has a zero target", seed.key)));
        }
    }
    Ok(())
}
