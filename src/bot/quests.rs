//! Quest progress, listing and claiming.
//!
//! Quests track one of two kinds of metric:
//!
//! - **event** metrics (`daily_bonus`, `weekly_bonus`) advance when the
//!   matching action happens, through [`record_event`];
//! - **snapshot** metrics (`level`, `friends`) are read from live state each
//!   time a quest is shown or claimed.
//!
//! Completion is stamped the first time progress reaches the target and is
//! never cleared. A (user, quest) pair can be claimed once; the stamp and the
//! reward are written in the same transaction.
use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::bot::economy::{self, Reward};
use crate::bot::errors::CommandError;
use crate::storage::{
    BotStore, ClaimOutcome, QuestMetric, QuestPeriod, QuestRecord, QuestSeed, QuestStatus, ReseedSummary,
    StoreError, UserQuestRecord, UserRecord,
};

#[derive(Debug, Clone, PartialEq)]
pub struct QuestView {
    pub quest: QuestRecord,
    pub progress: UserQuestRecord,
}

impl QuestView {
    pub fn status(&self) -> QuestStatus {
        self.progress.status()
    }

    /// One chat line, e.g. `#3 Add your first friend: 0/1 (100 coins, 50 XP)`.
    pub fn render(&self, prefix: &str) -> String {
        let state = match self.status() {
            QuestStatus::Claimed => "claimed".to_string(),
            QuestStatus::Completed => format!("ready! send {}claim {}", prefix, self.quest.id),
            QuestStatus::InProgress | QuestStatus::NotStarted => {
                format!("{}/{}", self.progress.progress.min(self.quest.target), self.quest.target)
            }
        };
        format!(
            "#{} {}: {} ({} coins, {} XP)",
            self.quest.id, self.quest.title, state, self.quest.reward_coins, self.quest.reward_xp
        )
    }
}

/// Live value of a snapshot metric for `user`.
fn snapshot_value(store: &BotStore, user: &UserRecord, metric: QuestMetric) -> Result<Option<u32>, StoreError> {
    Ok(match metric {
        QuestMetric::Level => Some(user.level),
        QuestMetric::Friends => Some(u32::try_from(store.count_friends(&user.chat_id)?).unwrap_or(u32::MAX)),
        QuestMetric::DailyBonus | QuestMetric::WeeklyBonus => None,
    })
}

/// Ensure a progress row exists, refresh snapshot progress and stamp
/// completion. Persists only when something changed.
fn refresh(
    store: &BotStore,
    user: &UserRecord,
    quest: &QuestRecord,
    now: DateTime<Utc>,
) -> Result<UserQuestRecord, StoreError> {
    let mut progress = store.ensure_user_quest(&user.chat_id, quest.id)?;
    let mut dirty = false;
    if quest.active && quest.metric.is_snapshot() {
        if let Some(live) = snapshot_value(store, user, quest.metric)? {
            if live != progress.progress {
                progress.progress = live;
                dirty = true;
            }
        }
    }
    if progress.mark_completed_if_reached(quest.target, now) {
        debug!("quest {} completed by {}", quest.key, user.chat_id);
        dirty = true;
    }
    if dirty {
        store.put_user_quest(&progress)?;
    }
    Ok(progress)
}

/// Active quests of `period` with the user's refreshed progress, in catalog order.
pub fn list_for_user(
    store: &BotStore,
    user: &UserRecord,
    period: QuestPeriod,
    now: DateTime<Utc>,
) -> Result<Vec<QuestView>, StoreError> {
    let mut views = Vec::new();
    for quest in store.list_quests()? {
        if !quest.active || quest.period != period {
            continue;
        }
        let progress = refresh(store, user, &quest, now)?;
        views.push(QuestView { quest, progress });
    }
    Ok(views)
}

/// Advance every active quest tracking `metric` by `amount`. Returns the
/// quests this event completed.
pub fn record_event(
    store: &BotStore,
    chat_id: &str,
    metric: QuestMetric,
    amount: u32,
    now: DateTime<Utc>,
) -> Result<Vec<QuestRecord>, StoreError> {
    let mut completed = Vec::new();
    for quest in store.list_quests()? {
        if !quest.active || quest.metric != metric {
            continue;
        }
        let mut progress = store.ensure_user_quest(chat_id, quest.id)?;
        if progress.completed_at.is_some() {
            continue;
        }
        progress.progress = progress.progress.saturating_add(amount);
        if progress.mark_completed_if_reached(quest.target, now) {
            completed.push(quest.clone());
        }
        store.put_user_quest(&progress)?;
    }
    Ok(completed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimReceipt {
    pub quest: QuestRecord,
    pub reward: Reward,
    pub user: UserRecord,
    pub leveled_up: bool,
}

/// Claim quest `quest_id` for `user`, crediting its reward scaled by `multiplier`.
pub fn claim(
    store: &BotStore,
    user: &UserRecord,
    quest_id: u64,
    multiplier: u32,
    now: DateTime<Utc>,
) -> Result<ClaimReceipt, CommandError> {
    let Some(quest) = store.get_quest(quest_id)? else {
        return Err(CommandError::not_found(format!("There is no quest #{}.", quest_id)));
    };
    let progress = refresh(store, user, &quest, now)?;
    let reward = Reward::new(quest.reward_coins, quest.reward_xp).scaled(multiplier);

    match store.claim_quest(&user.chat_id, quest.id, now, |u| {
        economy::grant(u, reward);
    })? {
        ClaimOutcome::Claimed(updated) => {
            info!("{} claimed quest {} ({})", user.chat_id, quest.id, quest.key);
            Ok(ClaimReceipt {
                leveled_up: updated.level > user.level,
                quest,
                reward,
                user: updated,
            })
        }
        ClaimOutcome::AlreadyClaimed => Err(CommandError::state(format!(
            "You already claimed quest #{}.",
            quest.id
        ))),
        ClaimOutcome::NotCompleted => Err(CommandError::state(format!(
            "Quest #{} isn't complete yet ({}/{}).",
            quest.id,
            progress.progress.min(quest.target),
            quest.target
        ))),
    }
}

/// Bring the catalog in line with `seeds`.
pub fn reseed(store: &BotStore, seeds: &[QuestSeed]) -> Result<ReseedSummary, StoreError> {
    let summary = store.reseed_quests(seeds)?;
    info!(
        "Quest catalog reseeded: {} inserted, {} updated, {} deactivated",
        summary.inserted, summary.updated, summary.deactivated
    );
    Ok(summary)
}
