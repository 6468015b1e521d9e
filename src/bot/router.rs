//! Prefix-based command resolution and onboarding gates.
//!
//! Text that does not start with the chat's prefix is ordinary conversation
//! and is ignored. Everything after the prefix is split on whitespace; the
//! first word (case-insensitive) names the command and the rest are its
//! arguments.
//!
//! Each [`Command`] declares a [`Gate`]. The match in [`Command::gate`] is
//! exhaustive, so adding a command without deciding who may run it does not
//! compile.
use log::trace;

use crate::bot::errors::CommandError;
use crate::bot::onboarding::OnboardingState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command word.
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Arguments joined back into one string (for display names).
    pub fn rest(&self) -> String {
        self.args.join(" ")
    }
}

/// Who may run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Any sender in any onboarding state.
    Open,
    /// Senders whose chat has completed onboarding.
    Verified,
    /// Privileged identities only, regardless of onboarding.
    Privileged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Help,
    Consent,
    Accept,
    Register,
    Profile,
    Balance,
    Daily,
    Weekly,
    Quests,
    Claim,
    Friend,
    Friends,
    Rename,
    ConfirmRename,
    Delete,
    ConfirmDelete,
    Prefix,
    Top,
    Grant,
    Reseed,
}

impl Command {
    pub const ALL: [Command; 20] = [
        Command::Help,
        Command::Consent,
        Command::Accept,
        Command::Register,
        Command::Profile,
        Command::Balance,
        Command::Daily,
        Command::Weekly,
        Command::Quests,
        Command::Claim,
        Command::Friend,
        Command::Friends,
        Command::Rename,
        Command::ConfirmRename,
        Command::Delete,
        Command::ConfirmDelete,
        Command::Prefix,
        Command::Top,
        Command::Grant,
        Command::Reseed,
    ];

    pub fn from_name(name: &str) -> Option<Command> {
        let cmd = match name.to_ascii_lowercase().as_str() {
            "help" | "?" | "commands" => Command::Help,
            "consent" | "terms" => Command::Consent,
            "accept" | "agree" => Command::Accept,
            "register" => Command::Register,
            "profile" | "me" => Command::Profile,
            "balance" | "bal" => Command::Balance,
            "daily" => Command::Daily,
            "weekly" => Command::Weekly,
            "quests" | "quest" => Command::Quests,
            "claim" => Command::Claim,
            "friend" | "addfriend" => Command::Friend,
            "friends" => Command::Friends,
            "rename" => Command::Rename,
            "confirmrename" => Command::ConfirmRename,
            "delete" | "deleteme" => Command::Delete,
            "confirmdelete" => Command::ConfirmDelete,
            "prefix" => Command::Prefix,
            "top" | "leaderboard" => Command::Top,
            "grant" => Command::Grant,
            "reseed" => Command::Reseed,
            _ => return None,
        };
        Some(cmd)
    }

    /// Canonical name, used in help text and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Consent => "consent",
            Command::Accept => "accept",
            Command::Register => "register",
            Command::Profile => "profile",
            Command::Balance => "balance",
            Command::Daily => "daily",
            Command::Weekly => "weekly",
            Command::Quests => "quests",
            Command::Claim => "claim",
            Command::Friend => "friend",
            Command::Friends => "friends",
            Command::Rename => "rename",
            Command::ConfirmRename => "confirmrename",
            Command::Delete => "delete",
            Command::ConfirmDelete => "confirmdelete",
            Command::Prefix => "prefix",
            Command::Top => "top",
            Command::Grant => "grant",
            Command::Reseed => "reseed",
        }
    }

    pub fn gate(&self) -> Gate {
        match self {
            Command::Help | Command::Consent | Command::Accept | Command::Register => Gate::Open,
            Command::Profile
            | Command::Balance
            | Command::Daily
            | Command::Weekly
            | Command::Quests
            | Command::Claim
            | Command::Friend
            | Command::Friends
            | Command::Rename
            | Command::ConfirmRename
            | Command::Delete
            | Command::ConfirmDelete
            | Command::Prefix
            | Command::Top => Gate::Verified,
            Command::Grant | Command::Reseed => Gate::Privileged,
        }
    }

    /// Argument synopsis and one-line description for help output.
    pub fn usage(&self) -> (&'static str, &'static str) {
        match self {
            Command::Help => ("", "list commands"),
            Command::Consent => ("", "read the terms"),
            Command::Accept => ("", "accept the terms"),
            Command::Register => (" <name>", "choose your display name"),
            Command::Profile => ("", "your profile"),
            Command::Balance => ("", "your coins"),
            Command::Daily => ("", "daily bonus"),
            Command::Weekly => ("", "weekly bonus"),
            Command::Quests => (" [daily|weekly|monthly|progress]", "quest list"),
            Command::Claim => (" <id>", "claim a finished quest"),
            Command::Friend => (" <code>", "add a friend by code"),
            Command::Friends => ("", "your friends"),
            Command::Rename => (" <name>", "change your name"),
            Command::ConfirmRename => (" <code>", "confirm a rename"),
            Command::Delete => ("", "delete your account"),
            Command::ConfirmDelete => (" <code>", "confirm deletion"),
            Command::Prefix => (" <prefix>", "change this chat's prefix"),
            Command::Top => ("", "leaderboard"),
            Command::Grant => (" <chat> <coins> <xp>", "credit a user"),
            Command::Reseed => ("", "reload the quest catalog"),
        }
    }
}

/// Split `text` into a command word and arguments if it begins with `prefix`.
pub fn resolve(text: &str, prefix: &str) -> Option<ParsedCommand> {
    if prefix.is_empty() || !text.starts_with(prefix) {
        return None;
    }
    let mut words = text[prefix.len()..].split_whitespace();
    let name = words.next()?.to_lowercase();
    let args: Vec<String> = words.map(str::to_string).collect();
    trace!("Resolved '{}' with {} args", name, args.len());
    Some(ParsedCommand { name, args })
}

/// Check `command` against the sender's onboarding state and privileges.
/// Rejections for non-verified chats carry the next onboarding step.
pub fn check_gate(
    command: Command,
    state: &OnboardingState,
    privileged: bool,
    prefix: &str,
) -> Result<(), CommandError> {
    match command.gate() {
        Gate::Open => Ok(()),
        Gate::Privileged if privileged => Ok(()),
        Gate::Privileged => Err(CommandError::Unauthorized),
        Gate::Verified => match state.directive(prefix) {
            None => Ok(()),
            Some(directive) => Err(CommandError::State(directive)),
        },
    }
}
