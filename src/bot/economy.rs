//! Coins, XP, levels and the recurring bonuses.
//!
//! Level and rank title are pure functions of XP. [`apply_xp`] is the only
//! code path that grants XP, and it writes `xp`, `level` and `level_role`
//! together. `roles::recompute` may repair the derived pair from stored XP.
//!
//! | Level | Rank   |
//! |-------|--------|
//! | 1-4   | Rookie |
//! | 5-9   | Adept  |
//! | 10-19 | Pro    |
//! | 20-29 | Elite  |
//! | 30+   | Legend |

use chrono::{Datelike, NaiveDate};

use crate::storage::{LevelRole, UserRecord};

/// XP needed per level.
pub const XP_PER_LEVEL: u64 = 1000;

pub const LEVEL_ADEPT: u32 = 5;
pub const LEVEL_PRO: u32 = 10;
pub const LEVEL_ELITE: u32 = 20;
pub const LEVEL_LEGEND: u32 = 30;

pub const DAILY_BASE_COINS: i64 = 100;
pub const DAILY_STREAK_COINS: i64 = 20;
pub const DAILY_BASE_XP: u64 = 25;
pub const DAILY_STREAK_XP: u64 = 5;
pub const WEEKLY_COINS: i64 = 500;
pub const WEEKLY_XP: u64 = 200;

/// `xp / 1000 + 1`, saturating at `u32::MAX`.
pub fn xp_to_level(xp: u64) -> u32 {
    u32::try_from(xp / XP_PER_LEVEL).map_or(u32::MAX, |l| l.saturating_add(1))
}

/// XP still missing before the next level.
pub fn xp_to_next_level(xp: u64) -> u64 {
    let next = u64::from(xp_to_level(xp)).saturating_mul(XP_PER_LEVEL);
    next.saturating_sub(xp)
}

pub fn level_to_role(level: u32) -> LevelRole {
    match level {
        l if l >= LEVEL_LEGEND => LevelRole::Legend,
        l if l >= LEVEL_ELITE => LevelRole::Elite,
        l if l >= LEVEL_PRO => LevelRole::Pro,
        l if l >= LEVEL_ADEPT => LevelRole::Adept,
        _ => LevelRole::Rookie,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpOutcome {
    pub xp: u64,
    pub level: u32,
    pub level_role: LevelRole,
    pub previous_level: u32,
    pub previous_role: LevelRole,
}

impl XpOutcome {
    pub fn leveled_up(&self) -> bool {
        self.level > self.previous_level
    }

    pub fn ranked_up(&self) -> bool {
        self.level_role > self.previous_role
    }

    /// Extra reply line announcing a level or rank change, if any.
    pub fn announcement(&self) -> Option<String> {
        match (self.leveled_up(), self.ranked_up()) {
            (_, true) => Some(format!("Level up! You are now level {} ({}).", self.level, self.level_role)),
            (true, false) => Some(format!("Level up! You are now level {}.", self.level)),
            _ => None,
        }
    }
}

/// Add `delta` XP and recompute level and rank from the new total.
pub fn apply_xp(user: &mut UserRecord, delta: u64) -> XpOutcome {
    let previous_level = user.level;
    let previous_role = user.level_role;
    user.xp = user.xp.saturating_add(delta);
    user.level = xp_to_level(user.xp);
    user.level_role = level_to_role(user.level);
    XpOutcome {
        xp: user.xp,
        level: user.level,
        level_role: user.level_role,
        previous_level,
        previous_role,
    }
}

/// A coin and XP payout before any multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub coins: i64,
    pub xp: u64,
}

impl Reward {
    pub fn new(coins: i64, xp: u64) -> Self {
        Self { coins, xp }
    }

    pub fn scaled(self, multiplier: u32) -> Self {
        Self {
            coins: self.coins.saturating_mul(i64::from(multiplier)),
            xp: self.xp.saturating_mul(u64::from(multiplier)),
        }
    }
}

/// Credit `reward` (already scaled) to `user`.
pub fn grant(user: &mut UserRecord, reward: Reward) -> XpOutcome {
    user.balance = user.balance.saturating_add(reward.coins);
    apply_xp(user, reward.xp)
}

/// Reward multiplier policy. Privileged senders get `privileged_multiplier`,
/// everyone else 1. The factor is never shown in replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    privileged_multiplier: u32,
}

impl RewardPolicy {
    pub fn new(privileged_multiplier: u32) -> Self {
        Self {
            privileged_multiplier: privileged_multiplier.max(1),
        }
    }

    pub fn multiplier(&self, privileged: bool) -> u32 {
        if privileged {
            self.privileged_multiplier
        } else {
            1
        }
    }
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BonusError {
    AlreadyClaimedToday,
    AlreadyClaimedThisWeek { week: String },
}

impl std::fmt::Display for BonusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BonusError::AlreadyClaimedToday => {
                write!(f, "You already claimed today's bonus. Come back tomorrow (UTC).")
            }
            BonusError::AlreadyClaimedThisWeek { week } => {
                write!(f, "You already claimed the weekly bonus for {}. It resets on Monday (UTC).", week)
            }
        }
    }
}

impl std::error::Error for BonusError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusGrant {
    pub reward: Reward,
    pub streak: u32,
    pub outcome: XpOutcome,
}

/// Daily bonus: `(100 + 20*streak)` coins and `(25 + 5*streak)` XP, both
/// scaled by `multiplier`. The streak grows only when yesterday was the last
/// claim; any gap restarts it at 1.
pub fn daily_bonus(user: &mut UserRecord, today: NaiveDate, multiplier: u32) -> Result<BonusGrant, BonusError> {
    if user.last_daily == Some(today) {
        return Err(BonusError::AlreadyClaimedToday);
    }
    let streak = match (user.last_daily, today.pred_opt()) {
        (Some(last), Some(yesterday)) if last == yesterday => user.daily_streak.saturating_add(1),
        _ => 1,
    };
    let reward = Reward::new(
        DAILY_BASE_COINS.saturating_add(DAILY_STREAK_COINS.saturating_mul(i64::from(streak))),
        DAILY_BASE_XP.saturating_add(DAILY_STREAK_XP.saturating_mul(u64::from(streak))),
    )
    .scaled(multiplier);

    user.last_daily = Some(today);
    user.daily_streak = streak;
    let outcome = grant(user, reward);
    Ok(BonusGrant { reward, streak, outcome })
}

/// Weekly bonus keyed by ISO week string (see [`iso_week_key`]).
pub fn weekly_bonus(user: &mut UserRecord, week: &str, multiplier: u32) -> Result<BonusGrant, BonusError> {
    if user.last_weekly.as_deref() == Some(week) {
        return Err(BonusError::AlreadyClaimedThisWeek { week: week.to_string() });
    }
    let reward = Reward::new(WEEKLY_COINS, WEEKLY_XP).scaled(multiplier);
    user.last_weekly = Some(week.to_string());
    let outcome = grant(user, reward);
    Ok(BonusGrant {
        reward,
        streak: 0,
        outcome,
    })
}

/// ISO-8601 week identifier, e.g. `2025-W01`. Uses the ISO week-numbering
/// year, so 2024-12-30 maps to `2025-W01`.
pub fn iso_week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
