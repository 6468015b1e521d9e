//! Records persisted by [`BotStore`](super::BotStore).
//!
//! Every record is bincode-encoded into its own sled tree. Derived fields on
//! [`UserRecord`] (`level`, `level_role`, `user_role`) are stored for display
//! and for external tooling, but the economy and role modules are the only
//! authorities for their values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const USER_SCHEMA_VERSION: u8 = 1;
pub const QUEST_SCHEMA_VERSION: u8 = 1;

/// Access role derived from privileged-identity membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    User,
    Owner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Owner => "owner",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank title derived from level. Variants are declared lowest first so the
/// derived ordering matches rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LevelRole {
    Rookie,
    Adept,
    Pro,
    Elite,
    Legend,
}

impl LevelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelRole::Rookie => "Rookie",
            LevelRole::Adept => "Adept",
            LevelRole::Pro => "Pro",
            LevelRole::Elite => "Elite",
            LevelRole::Legend => "Legend",
        }
    }
}

impl fmt::Display for LevelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user, keyed by chat identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub chat_id: String,
    pub display_name: String,
    pub friend_code: String,
    pub balance: i64,
    pub xp: u64,
    pub level: u32,
    pub last_daily: Option<NaiveDate>,
    pub daily_streak: u32,
    /// ISO week key of the last weekly bonus, e.g. `2026-W42`.
    pub last_weekly: Option<String>,
    pub consent_at: Option<DateTime<Utc>>,
    pub consent_version: Option<String>,
    pub user_role: UserRole,
    pub level_role: LevelRole,
    pub last_name_change: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl UserRecord {
    pub fn new(chat_id: &str, display_name: &str, friend_code: &str, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            display_name: display_name.to_string(),
            friend_code: friend_code.to_string(),
            balance: 0,
            xp: 0,
            level: 1,
            last_daily: None,
            daily_streak: 0,
            last_weekly: None,
            consent_at: None,
            consent_version: None,
            user_role: UserRole::User,
            level_role: LevelRole::Rookie,
            last_name_change: None,
            created_at: now,
            schema_version: USER_SCHEMA_VERSION,
        }
    }

    pub fn with_consent(mut self, accepted_at: DateTime<Utc>, version: &str) -> Self {
        self.consent_at = Some(accepted_at);
        self.consent_version = Some(version.to_string());
        self
    }

    pub fn has_consent(&self) -> bool {
        self.consent_at.is_some()
    }
}

/// Consent recorded before a user row exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingConsent {
    pub chat_id: String,
    pub accepted_at: DateTime<Utc>,
    pub version: String,
}

/// Renewal cadence used to group quests for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestPeriod {
    Daily,
    Weekly,
    Monthly,
    Progress,
}

impl QuestPeriod {
    pub const ALL: [QuestPeriod; 4] = [
        QuestPeriod::Daily,
        QuestPeriod::Weekly,
        QuestPeriod::Monthly,
        QuestPeriod::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestPeriod::Daily => "daily",
            QuestPeriod::Weekly => "weekly",
            QuestPeriod::Monthly => "monthly",
            QuestPeriod::Progress => "progress",
        }
    }
}

impl FromStr for QuestPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(QuestPeriod::Daily),
            "weekly" | "w" => Ok(QuestPeriod::Weekly),
            "monthly" | "m" => Ok(QuestPeriod::Monthly),
            "progress" | "p" => Ok(QuestPeriod::Progress),
            other => Err(format!("unknown quest period '{}'", other)),
        }
    }
}

impl fmt::Display for QuestPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a quest counts.
///
/// Event metrics are advanced when the matching action happens; snapshot
/// metrics are recomputed from live user state whenever quests are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestMetric {
    DailyBonus,
    WeeklyBonus,
    Level,
    Friends,
}

impl QuestMetric {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, QuestMetric::Level | QuestMetric::Friends)
    }
}

/// Catalog entry. Never deleted; deactivated when its key leaves the seed set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestRecord {
    pub id: u64,
    pub key: String,
    pub title: String,
    pub period: QuestPeriod,
    pub metric: QuestMetric,
    pub target: u32,
    pub reward_coins: i64,
    pub reward_xp: u64,
    pub active: bool,
    pub schema_version: u8,
}

/// Where a user stands on a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestStatus {
    NotStarted,
    InProgress,
    Completed,
    Claimed,
}

/// Per-user progress on one quest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserQuestRecord {
    pub chat_id: String,
    pub quest_id: u64,
    pub progress: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl UserQuestRecord {
    pub fn new(chat_id: &str, quest_id: u64) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            quest_id,
            progress: 0,
            completed_at: None,
            claimed_at: None,
        }
    }

    pub fn status(&self) -> QuestStatus {
        if self.claimed_at.is_some() {
            QuestStatus::Claimed
        } else if self.completed_at.is_some() {
            QuestStatus::Completed
        } else if self.progress > 0 {
            QuestStatus::InProgress
        } else {
            QuestStatus::NotStarted
        }
    }

    /// Stamp completion the first time progress reaches `target`. Returns true
    /// only on the call that stamped.
    pub fn mark_completed_if_reached(&mut self, target: u32, now: DateTime<Utc>) -> bool {
        if self.completed_at.is_none() && self.progress >= target {
            self.completed_at = Some(now);
            return true;
        }
        false
    }
}

/// One directed edge of a friendship. Both directions are always written together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendshipRecord {
    pub chat_id: String,
    pub friend_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_quest_status_follows_stamps() {
        let now = Utc::now();
        let mut uq = UserQuestRecord::new("c1", 7);
        assert_eq!(uq.status(), QuestStatus::NotStarted);
        uq.progress = 1;
        assert_eq!(uq.status(), QuestStatus::InProgress);
        assert!(!uq.mark_completed_if_reached(3, now));
        uq.progress = 3;
        assert!(uq.mark_completed_if_reached(3, now));
        assert!(!uq.mark_completed_if_reached(3, now + chrono::Duration::seconds(5)));
        assert_eq!(uq.completed_at, Some(now));
        assert_eq!(uq.status(), QuestStatus::Completed);
        uq.claimed_at = Some(now);
        assert_eq!(uq.status(), QuestStatus::Claimed);
    }

    #[test]
    fn period_parses_aliases() {
        assert_eq!("WEEKLY".parse::<QuestPeriod>(), Ok(QuestPeriod::Weekly));
        assert_eq!("p".parse::<QuestPeriod>(), Ok(QuestPeriod::Progress));
        assert!("yearly".parse::<QuestPeriod>().is_err());
    }
}
