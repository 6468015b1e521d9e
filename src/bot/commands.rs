//! Command handlers.
//!
//! [`CommandProcessor::execute`] resolves the chat prefix, parses the command,
//! loads the onboarding state, applies the gate, heals stored roles and hands
//! off to one handler from [`handler_for`]. Handlers share one signature and
//! return the fully rendered reply.
//!
//! Handlers are synchronous; the caller holds the per-chat lock for the whole
//! call, so two handlers never interleave for the same chat.
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::bot::economy::{self, Reward, RewardPolicy};
use crate::bot::errors::CommandError;
use crate::bot::friends::{self, RedeemOutcome};
use crate::bot::onboarding::{self, ConsentOutcome, OnboardingState};
use crate::bot::pending::{ActionKind, PendingActionRegistry};
use crate::bot::quests;
use crate::bot::roles::{self, Privileges};
use crate::bot::router::{self, Command, Gate, ParsedCommand};
use crate::config::Config;
use crate::logutil::redact_chat_id;
use crate::metrics;
use crate::storage::{
    default_quest_seeds, load_quest_seeds_from_json, BotStore, QuestMetric, QuestPeriod, QuestRecord, QuestSeed,
    StoreError, UserRecord, UserRole,
};
use crate::validation::{validate_display_name, validate_prefix};

const LEADERBOARD_SIZE: usize = 10;

/// Everything a handler knows about the event it is serving.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub chat_id: String,
    pub sender_id: String,
    pub prefix: String,
    pub privileged: bool,
    pub now: DateTime<Utc>,
    pub state: OnboardingState,
}

impl CommandContext {
    fn user(&self) -> Result<&UserRecord, CommandError> {
        self.state.verified_user().ok_or_else(|| {
            CommandError::State(
                self.state
                    .directive(&self.prefix)
                    .unwrap_or_else(|| "Please register first.".to_string()),
            )
        })
    }
}

/// Result of feeding one message through [`CommandProcessor::execute`].
#[derive(Debug)]
pub enum Dispatch {
    /// Not addressed to the bot.
    Ignored,
    /// Prefixed, but not a known command. Carries the hint to send back.
    Unknown(String),
    Handled {
        command: Command,
        result: Result<String, CommandError>,
    },
}

type Handler = fn(&CommandProcessor, &CommandContext, &ParsedCommand) -> Result<String, CommandError>;

/// The handler for every command.
pub fn handler_for(command: Command) -> Handler {
    match command {
        Command::Help => CommandProcessor::handle_help,
        Command::Consent => CommandProcessor::handle_consent,
        Command::Accept => CommandProcessor::handle_accept,
        Command::Register => CommandProcessor::handle_register,
        Command::Profile => CommandProcessor::handle_profile,
        Command::Balance => CommandProcessor::handle_balance,
        Command::Daily => CommandProcessor::handle_daily,
        Command::Weekly => CommandProcessor::handle_weekly,
        Command::Quests => CommandProcessor::handle_quests,
        Command::Claim => CommandProcessor::handle_claim,
        Command::Friend => CommandProcessor::handle_friend,
        Command::Friends => CommandProcessor::handle_friends,
        Command::Rename => CommandProcessor::handle_rename,
        Command::ConfirmRename => CommandProcessor::handle_confirm_rename,
        Command::Delete => CommandProcessor::handle_delete,
        Command::ConfirmDelete => CommandProcessor::handle_confirm_delete,
        Command::Prefix => CommandProcessor::handle_prefix,
        Command::Top => CommandProcessor::handle_top,
        Command::Grant => CommandProcessor::handle_grant,
        Command::Reseed => CommandProcessor::handle_reseed,
    }
}

pub struct CommandProcessor {
    store: Arc<BotStore>,
    privileges: Privileges,
    rewards: RewardPolicy,
    pending: PendingActionRegistry,
    bot_name: String,
    default_prefix: String,
    consent_version: String,
    terms: String,
    name_cooldown: chrono::Duration,
    seed_file: Option<String>,
}

impl CommandProcessor {
    pub fn new(config: &Config, store: Arc<BotStore>) -> Self {
        Self {
            store,
            privileges: Privileges::new(config.bot.privileged.iter().cloned()),
            rewards: RewardPolicy::new(config.rewards.privileged_multiplier),
            pending: PendingActionRegistry::new(config.confirmations.token_ttl()),
            bot_name: config.bot.name.clone(),
            default_prefix: config.default_prefix(),
            consent_version: config.bot.consent_version.clone(),
            terms: config.bot.terms.clone(),
            name_cooldown: config.confirmations.name_change_cooldown(),
            seed_file: config.storage.quest_seed_file.clone(),
        }
    }

    pub fn store(&self) -> &BotStore {
        &self.store
    }

    pub fn pending_actions(&self) -> &PendingActionRegistry {
        &self.pending
    }

    /// The chat's own prefix, or the configured default.
    pub fn prefix_for(&self, chat_id: &str) -> String {
        match self.store.get_prefix(chat_id) {
            Ok(Some(prefix)) => prefix,
            Ok(None) => self.default_prefix.clone(),
            Err(e) => {
                warn!("prefix lookup failed for {}: {}", redact_chat_id(chat_id), e);
                self.default_prefix.clone()
            }
        }
    }

    /// Quest catalog from the configured seed file, or the built-in one.
    pub fn quest_seeds(&self) -> Result<Vec<QuestSeed>, StoreError> {
        match &self.seed_file {
            Some(path) => load_quest_seeds_from_json(path),
            None => Ok(default_quest_seeds()),
        }
    }

    pub fn execute(&self, chat_id: &str, sender_id: &str, text: &str, now: DateTime<Utc>) -> Dispatch {
        let prefix = self.prefix_for(chat_id);
        let Some(parsed) = router::resolve(text, &prefix) else {
            return Dispatch::Ignored;
        };
        let Some(command) = Command::from_name(&parsed.name) else {
            return Dispatch::Unknown(format!(
                "I don't know '{}'. Send {}help for the list of commands.",
                parsed.name, prefix
            ));
        };
        let privileged = self.privileges.contains(sender_id);
        let result = self.run(command, chat_id, sender_id, prefix, privileged, &parsed, now);
        Dispatch::Handled { command, result }
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        command: Command,
        chat_id: &str,
        sender_id: &str,
        prefix: String,
        privileged: bool,
        parsed: &ParsedCommand,
        now: DateTime<Utc>,
    ) -> Result<String, CommandError> {
        let mut state = OnboardingState::load(&self.store, chat_id)?;
        if let Err(rejection) = router::check_gate(command, &state, privileged, &prefix) {
            debug!("{} gated for {} in state {}", command.name(), redact_chat_id(chat_id), state.name());
            metrics::inc_gate_rejections();
            return Err(rejection);
        }
        if let OnboardingState::Verified(user) = &state {
            let healed = roles::recompute(&self.store, user, privileged)?;
            state = OnboardingState::Verified(healed);
        }
        let ctx = CommandContext {
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            prefix,
            privileged,
            now,
            state,
        };
        handler_for(command)(self, &ctx, parsed)
    }

    fn ttl_text(&self) -> String {
        let secs = self.pending.ttl().num_seconds();
        if secs % 60 == 0 {
            let mins = secs / 60;
            format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
        } else {
            format!("{} seconds", secs)
        }
    }

    /// Advance quests after a bonus has already been paid. A failure here must
    /// not turn the paid bonus into an error reply, so it is only logged.
    fn record_bonus_event(&self, ctx: &CommandContext, metric: QuestMetric) -> Vec<QuestRecord> {
        match quests::record_event(&self.store, &ctx.chat_id, metric, 1, ctx.now) {
            Ok(completed) => completed,
            Err(e) => {
                error!(
                    "quest progress for {:?} lost for {}: {}",
                    metric,
                    redact_chat_id(&ctx.chat_id),
                    e
                );
                Vec::new()
            }
        }
    }

    fn completed_lines(completed: &[QuestRecord], prefix: &str) -> Vec<String> {
        completed
            .iter()
            .map(|q| format!("Quest complete: #{} {}. Send {}claim {} for the reward.", q.id, q.title, prefix, q.id))
            .collect()
    }

    // ------------------------------------------------------------------
    // Onboarding
    // ------------------------------------------------------------------

    fn handle_help(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let verified = ctx.state.is_verified();
        let mut lines = vec![format!("{} commands:", self.bot_name)];
        for command in Command::ALL {
            let visible = match command.gate() {
                Gate::Open => true,
                Gate::Verified => verified,
                Gate::Privileged => ctx.privileged,
            };
            if visible {
                let (args, desc) = command.usage();
                lines.push(format!("{}{}{} - {}", ctx.prefix, command.name(), args, desc));
            }
        }
        if let Some(directive) = ctx.state.directive(&ctx.prefix) {
            lines.push(String::new());
            lines.push(directive);
        }
        Ok(lines.join("\n"))
    }

    fn handle_consent(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        Ok(format!(
            "Terms (version {}):\n{}\nSend {}accept to agree.",
            self.consent_version, self.terms, ctx.prefix
        ))
    }

    fn handle_accept(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let outcome =
            onboarding::accept_consent(&self.store, &ctx.state, &ctx.chat_id, &self.consent_version, ctx.now)?;
        Ok(match outcome {
            ConsentOutcome::Recorded => format!(
                "Thanks, consent recorded. Now choose a name with {}register <name>.",
                ctx.prefix
            ),
            ConsentOutcome::AlreadyPending => format!(
                "You've already accepted. Next: {}register <name>.",
                ctx.prefix
            ),
            ConsentOutcome::StampedExisting(user) => format!(
                "Thanks, {}! You're all set. Send {}help to see what you can do.",
                user.display_name, ctx.prefix
            ),
            ConsentOutcome::AlreadyVerified => "You've already accepted the terms.".to_string(),
        })
    }

    fn handle_register(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        if cmd.args.is_empty() && matches!(ctx.state, OnboardingState::ConsentPending(_)) {
            return Err(CommandError::validation(format!("Usage: {}register <name>", ctx.prefix)));
        }
        let user = onboarding::register(&self.store, &ctx.state, &ctx.chat_id, &cmd.rest(), &ctx.prefix, ctx.now)?;
        let user = roles::recompute(&self.store, &user, ctx.privileged)?;
        Ok(format!(
            "Welcome, {name}! Your friend code is {code}. Friends can add you with {p}friend {code}. Send {p}help to see what you can do.",
            name = user.display_name,
            code = user.friend_code,
            p = ctx.prefix
        ))
    }

    // ------------------------------------------------------------------
    // Economy
    // ------------------------------------------------------------------

    fn handle_profile(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        let mut lines = vec![
            format!("{} ({})", user.display_name, user.level_role),
            format!(
                "Level {} - {} XP, {} to next level",
                user.level,
                user.xp,
                economy::xp_to_next_level(user.xp)
            ),
            format!("Coins: {}", user.balance),
            format!("Daily streak: {}", user.daily_streak),
            format!("Friend code: {}", user.friend_code),
        ];
        if user.user_role == UserRole::Owner {
            lines.push(format!("Role: {}", user.user_role));
        }
        Ok(lines.join("\n"))
    }

    fn handle_balance(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        Ok(format!("You have {} coins.", user.balance))
    }

    fn handle_daily(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let multiplier = self.rewards.multiplier(ctx.privileged);
        let today = ctx.now.date_naive();
        let grant = self.store.update_user(&ctx.chat_id, |u| {
            economy::daily_bonus(u, today, multiplier).map_err(|e| CommandError::state(e.to_string()))
        })?;
        let completed = self.record_bonus_event(ctx, QuestMetric::DailyBonus);

        let mut lines = vec![format!(
            "Daily bonus: +{} coins, +{} XP. Streak: {} day{}.",
            grant.reward.coins,
            grant.reward.xp,
            grant.streak,
            if grant.streak == 1 { "" } else { "s" }
        )];
        lines.extend(grant.outcome.announcement());
        lines.extend(Self::completed_lines(&completed, &ctx.prefix));
        Ok(lines.join("\n"))
    }

    fn handle_weekly(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let multiplier = self.rewards.multiplier(ctx.privileged);
        let week = economy::iso_week_key(ctx.now.date_naive());
        let grant = self.store.update_user(&ctx.chat_id, |u| {
            economy::weekly_bonus(u, &week, multiplier).map_err(|e| CommandError::state(e.to_string()))
        })?;
        let completed = self.record_bonus_event(ctx, QuestMetric::WeeklyBonus);

        let mut lines = vec![format!(
            "Weekly bonus: +{} coins, +{} XP.",
            grant.reward.coins, grant.reward.xp
        )];
        lines.extend(grant.outcome.announcement());
        lines.extend(Self::completed_lines(&completed, &ctx.prefix));
        Ok(lines.join("\n"))
    }

    fn handle_top(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let mut users: Vec<UserRecord> = self.store.list_users()?.into_iter().filter(|u| u.has_consent()).collect();
        users.sort_by(|a, b| {
            b.xp.cmp(&a.xp)
                .then(b.balance.cmp(&a.balance))
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        let mut lines = vec!["Top players:".to_string()];
        for (rank, user) in users.iter().take(LEADERBOARD_SIZE).enumerate() {
            let marker = if user.chat_id == ctx.chat_id { " (you)" } else { "" };
            lines.push(format!(
                "{}. {} - level {}, {} XP{}",
                rank + 1,
                user.display_name,
                user.level,
                user.xp,
                marker
            ));
        }
        Ok(lines.join("\n"))
    }

    // ------------------------------------------------------------------
    // Quests
    // ------------------------------------------------------------------

    fn handle_quests(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        let period = match cmd.args.first() {
            Some(raw) => raw.parse::<QuestPeriod>().map_err(|_| {
                CommandError::validation(format!("Usage: {}quests [daily|weekly|monthly|progress]", ctx.prefix))
            })?,
            None => QuestPeriod::Daily,
        };
        let views = quests::list_for_user(&self.store, user, period, ctx.now)?;
        if views.is_empty() {
            return Ok(format!("No active {} quests right now.", period));
        }
        let mut lines = vec![format!("{} quests:", period_title(period))];
        lines.extend(views.iter().map(|v| v.render(&ctx.prefix)));
        Ok(lines.join("\n"))
    }

    fn handle_claim(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        let usage = || CommandError::validation(format!("Usage: {}claim <quest id>", ctx.prefix));
        let raw = cmd.args.first().ok_or_else(usage)?;
        let quest_id: u64 = raw.trim_start_matches('#').parse().map_err(|_| usage())?;

        let multiplier = self.rewards.multiplier(ctx.privileged);
        let receipt = quests::claim(&self.store, user, quest_id, multiplier, ctx.now)?;
        let mut lines = vec![format!(
            "Claimed #{} {}: +{} coins, +{} XP.",
            receipt.quest.id, receipt.quest.title, receipt.reward.coins, receipt.reward.xp
        )];
        if receipt.leveled_up {
            lines.push(format!(
                "Level up! You are now level {} ({}).",
                receipt.user.level, receipt.user.level_role
            ));
        }
        Ok(lines.join("\n"))
    }

    // ------------------------------------------------------------------
    // Friends
    // ------------------------------------------------------------------

    fn handle_friend(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        let Some(code) = cmd.args.first() else {
            return Err(CommandError::validation(format!("Usage: {}friend <code>", ctx.prefix)));
        };
        Ok(match friends::redeem(&self.store, user, code, ctx.now)? {
            RedeemOutcome::Added(friend) => format!("You and {} are now friends!", friend.display_name),
            RedeemOutcome::AlreadyFriends(friend) => {
                format!("You're already friends with {}.", friend.display_name)
            }
        })
    }

    fn handle_friends(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        let list = friends::list(&self.store, user)?;
        if list.is_empty() {
            return Ok(format!(
                "No friends yet. Share your code {} so others can add you.",
                user.friend_code
            ));
        }
        let mut lines = vec![format!("Friends ({}):", list.len())];
        lines.extend(list.iter().map(|f| format!("- {} ({})", f.display_name, f.friend_code)));
        Ok(lines.join("\n"))
    }

    // ------------------------------------------------------------------
    // Confirmed actions
    // ------------------------------------------------------------------

    fn handle_rename(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        let user = ctx.user()?;
        if cmd.args.is_empty() {
            return Err(CommandError::validation(format!("Usage: {}rename <new name>", ctx.prefix)));
        }
        let name = validate_display_name(&cmd.rest()).map_err(|e| CommandError::validation(e.to_string()))?;
        if name == user.display_name {
            return Err(CommandError::validation("That's already your name."));
        }
        if !ctx.privileged {
            if let Some(last) = user.last_name_change {
                let allowed_at = last + self.name_cooldown;
                if ctx.now < allowed_at {
                    return Err(CommandError::state(format!(
                        "You can change your name again after {}.",
                        allowed_at.format("%Y-%m-%d %H:%M UTC")
                    )));
                }
            }
        }
        let token = self.pending.issue_at(&ctx.chat_id, ActionKind::Rename, Some(name.clone()), ctx.now);
        Ok(format!(
            "To become '{}', send {}confirmrename {} within {}.",
            name,
            ctx.prefix,
            token,
            self.ttl_text()
        ))
    }

    fn handle_confirm_rename(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        ctx.user()?;
        let Some(token) = cmd.args.first() else {
            return Err(CommandError::validation(format!("Usage: {}confirmrename <code>", ctx.prefix)));
        };
        let payload = self
            .pending
            .confirm_at(&ctx.chat_id, ActionKind::Rename, token, ctx.now)
            .map_err(|e| CommandError::state(e.to_string()))?;
        let Some(name) = payload else {
            return Err(CommandError::state(format!("Nothing to confirm. Start with {}rename <name>.", ctx.prefix)));
        };
        let now = ctx.now;
        self.store.update_user(&ctx.chat_id, |u| -> Result<(), CommandError> {
            u.display_name = name.clone();
            u.last_name_change = Some(now);
            Ok(())
        })?;
        info!("{} renamed to '{}'", redact_chat_id(&ctx.chat_id), name);
        Ok(format!("Done! You are now {}.", name))
    }

    fn handle_delete(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        ctx.user()?;
        let token = self.pending.issue_at(&ctx.chat_id, ActionKind::DeleteAccount, None, ctx.now);
        Ok(format!(
            "This permanently deletes your profile, coins, quests and friends. Send {}confirmdelete {} within {} to confirm.",
            ctx.prefix,
            token,
            self.ttl_text()
        ))
    }

    fn handle_confirm_delete(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        ctx.user()?;
        let Some(token) = cmd.args.first() else {
            return Err(CommandError::validation(format!("Usage: {}confirmdelete <code>", ctx.prefix)));
        };
        self.pending
            .confirm_at(&ctx.chat_id, ActionKind::DeleteAccount, token, ctx.now)
            .map_err(|e| CommandError::state(e.to_string()))?;
        self.store.delete_account(&ctx.chat_id)?;
        self.pending.clear_chat(&ctx.chat_id);
        info!(target: "security", "account deleted for {}", redact_chat_id(&ctx.chat_id));
        Ok(format!(
            "Your account and all its data are gone. Send {}consent if you ever want to start over.",
            self.default_prefix
        ))
    }

    fn handle_prefix(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        ctx.user()?;
        let Some(raw) = cmd.args.first() else {
            return Err(CommandError::validation(format!(
                "Current prefix is {}. Usage: {}prefix <new>",
                ctx.prefix, ctx.prefix
            )));
        };
        let prefix = validate_prefix(raw).map_err(|e| CommandError::validation(e.to_string()))?;
        self.store.set_prefix(&ctx.chat_id, &prefix)?;
        Ok(format!("Prefix changed to {p}. Try {p}help.", p = prefix))
    }

    // ------------------------------------------------------------------
    // Owner commands
    // ------------------------------------------------------------------

    fn handle_grant(&self, ctx: &CommandContext, cmd: &ParsedCommand) -> Result<String, CommandError> {
        let usage = || CommandError::validation(format!("Usage: {}grant <chat id> <coins> <xp>", ctx.prefix));
        let [target, coins, xp] = cmd.args.as_slice() else {
            return Err(usage());
        };
        let coins: i64 = coins.parse().map_err(|_| usage())?;
        let xp: u64 = xp.parse().map_err(|_| usage())?;
        if self.store.get_user(target)?.is_none() {
            return Err(CommandError::not_found(format!("No user with chat id {}.", target)));
        }
        let reward = Reward::new(coins, xp);
        let (name, outcome) = self.store.update_user(target, |u| -> Result<_, CommandError> {
            let outcome = economy::grant(u, reward);
            Ok((u.display_name.clone(), outcome))
        })?;
        info!(
            target: "security",
            "grant by {}: {} coins, {} XP to {}",
            redact_chat_id(&ctx.sender_id),
            coins,
            xp,
            redact_chat_id(target)
        );
        Ok(format!(
            "Granted {} coins and {} XP to {}. They are now level {} ({}).",
            coins, xp, name, outcome.level, outcome.level_role
        ))
    }

    fn handle_reseed(&self, ctx: &CommandContext, _cmd: &ParsedCommand) -> Result<String, CommandError> {
        let seeds = self
            .quest_seeds()
            .map_err(|e| CommandError::validation(format!("Quest seeds rejected: {}", e)))?;
        let summary = quests::reseed(&self.store, &seeds)?;
        info!(target: "security", "quest catalog reseeded by {}", redact_chat_id(&ctx.sender_id));
        Ok(format!(
            "Quest catalog reseeded: {} new, {} updated, {} retired.",
            summary.inserted, summary.updated, summary.deactivated
        ))
    }
}

fn period_title(period: QuestPeriod) -> &'static str {
    match period {
        QuestPeriod::Daily => "Daily",
        QuestPeriod::Weekly => "Weekly",
        QuestPeriod::Monthly => "Monthly",
        QuestPeriod::Progress => "Progress",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BotStoreBuilder;
    use tempfile::TempDir;

    fn processor() -> (TempDir, CommandProcessor) {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).open().expect("store");
        let user = UserRecord::new("c1", "Alice", "AAAA1111", Utc::now()).with_consent(Utc::now(), "v1");
        store.put_user(user).expect("put");
        (dir, CommandProcessor::new(&Config::default(), Arc::new(store)))
    }

    fn reply(dispatch: Dispatch) -> Result<String, CommandError> {
        match dispatch {
            Dispatch::Handled { result, .. } => result,
            other => panic!("unexpected dispatch {:?}", other),
        }
    }

    #[test]
    fn paid_bonus_is_reported_even_if_quest_progress_fails() {
        let (_dir, processor) = processor();
        processor.store().put_raw_quest(u64::MAX, b"not a quest").expect("corrupt row");

        let text = reply(processor.execute("c1", "c1", "!daily", Utc::now())).expect("daily reply");
        assert!(text.starts_with("Daily bonus: +120 coins"), "{}", text);
        let text = reply(processor.execute("c1", "c1", "!weekly", Utc::now())).expect("weekly reply");
        assert!(text.starts_with("Weekly bonus"), "{}", text);

        let user = processor.store().get_user("c1").expect("get").expect("user");
        assert_eq!(user.balance, 120 + 500);
    }

    #[test]
    fn gated_commands_return_the_directive() {
        let (_dir, processor) = processor();
        let err = reply(processor.execute("c9", "c9", "!daily", Utc::now())).unwrap_err();
        assert!(matches!(err, CommandError::State(ref msg) if msg.contains("!accept")), "{:?}", err);
    }
}

