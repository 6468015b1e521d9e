//! Short-lived confirmation tokens for destructive commands.
//!
//! At most one pending action exists per (chat, kind). Issuing again replaces
//! the previous token. Entries live in memory only; a restart forgets them,
//! which just means the user has to ask for a new code.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub const TOKEN_LEN: usize = 6;
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    DeleteAccount,
    Rename,
}

#[derive(Debug, Clone)]
pub struct PendingAction {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Action argument, e.g. the requested display name.
    pub payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    /// Nothing pending, or the token expired.
    NoValidOperation,
    /// A live token exists but this was not it. The entry is kept.
    WrongCode,
}

impl std::fmt::Display for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmError::NoValidOperation => write!(f, "There is no valid operation to confirm. Start again."),
            ConfirmError::WrongCode => write!(f, "Wrong confirmation code."),
        }
    }
}

impl std::error::Error for ConfirmError {}

/// Random uppercase alphanumeric string of `len` characters.
pub fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

pub struct PendingActionRegistry {
    entries: Mutex<HashMap<(String, ActionKind), PendingAction>>,
    ttl: Duration,
}

impl PendingActionRegistry {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(2)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, ActionKind), PendingAction>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn issue(&self, chat_id: &str, kind: ActionKind, payload: Option<String>) -> String {
        self.issue_at(chat_id, kind, payload, Utc::now())
    }

    /// Store a fresh token for (chat, kind) valid until `now + ttl`.
    pub fn issue_at(
        &self,
        chat_id: &str,
        kind: ActionKind,
        payload: Option<String>,
        now: DateTime<Utc>,
    ) -> String {
        let token = random_code(TOKEN_LEN);
        self.lock().insert(
            (chat_id.to_string(), kind),
            PendingAction {
                token: token.clone(),
                expires_at: now + self.ttl,
                payload,
            },
        );
        token
    }

    pub fn confirm(&self, chat_id: &str, kind: ActionKind, token: &str) -> Result<Option<String>, ConfirmError> {
        self.confirm_at(chat_id, kind, token, Utc::now())
    }

    /// Consume the pending action if `token` matches and has not expired.
    /// Returns the stored payload on success.
    pub fn confirm_at(
        &self,
        chat_id: &str,
        kind: ActionKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, ConfirmError> {
        let key = (chat_id.to_string(), kind);
        let mut entries = self.lock();
        let Some(entry) = entries.get(&key) else {
            return Err(ConfirmError::NoValidOperation);
        };
        if now > entry.expires_at {
            entries.remove(&key);
            return Err(ConfirmError::NoValidOperation);
        }
        if !entry.token.eq_ignore_ascii_case(token.trim()) {
            return Err(ConfirmError::WrongCode);
        }
        Ok(entries.remove(&key).and_then(|a| a.payload))
    }

    /// Forget every pending action for `chat_id` (after account deletion).
    pub fn clear_chat(&self, chat_id: &str) {
        self.lock().retain(|(chat, _), _| chat != chat_id);
    }

    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, action| action.expires_at >= now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PendingActionRegistry {
        PendingActionRegistry::new(std::time::Duration::from_secs(120))
    }

    #[test]
    fn tokens_are_six_uppercase_alphanumerics() {
        let reg = registry();
        let token = reg.issue("c1", ActionKind::DeleteAccount, None);
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn confirm_consumes_the_token() {
        let reg = registry();
        let token = reg.issue("c1", ActionKind::Rename, Some("Bob".into()));
        assert_eq!(reg.confirm("c1", ActionKind::Rename, &token.to_lowercase()), Ok(Some("Bob".into())));
        assert_eq!(
            reg.confirm("c1", ActionKind::Rename, &token),
            Err(ConfirmError::NoValidOperation)
        );
    }

    #[test]
    fn wrong_code_keeps_the_entry() {
        let reg = registry();
        let token = reg.issue("c1", ActionKind::DeleteAccount, None);
        let wrong = if token == "AAAAAA" { "BBBBBB" } else { "AAAAAA" };
        assert_eq!(reg.confirm("c1", ActionKind::DeleteAccount, wrong), Err(ConfirmError::WrongCode));
        assert_eq!(reg.confirm("c1", ActionKind::DeleteAccount, &token), Ok(None));
    }

    #[test]
    fn expired_tokens_are_rejected_and_removed() {
        let reg = registry();
        let issued = Utc::now() - Duration::minutes(5);
        let token = reg.issue_at("c1", ActionKind::DeleteAccount, None, issued);
        assert_eq!(
            reg.confirm("c1", ActionKind::DeleteAccount, &token),
            Err(ConfirmError::NoValidOperation)
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn kinds_and_chats_are_independent() {
        let reg = registry();
        reg.issue("c1", ActionKind::DeleteAccount, None);
        let rename = reg.issue("c1", ActionKind::Rename, Some("X".into()));
        reg.issue("c2", ActionKind::DeleteAccount, None);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.confirm("c1", ActionKind::Rename, &rename), Ok(Some("X".into())));
        assert_eq!(reg.len(), 2);
        reg.clear_chat("c1");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn reissue_replaces_previous_token() {
        let reg = registry();
        let now = Utc::now();
        reg.issue_at("c1", ActionKind::Rename, Some("A".into()), now);
        let second = reg.issue_at("c1", ActionKind::Rename, Some("B".into()), now);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.confirm_at("c1", ActionKind::Rename, &second, now), Ok(Some("B".into())));
    }

    #[test]
    fn prune_drops_only_expired() {
        let reg = registry();
        let now = Utc::now();
        reg.issue_at("old", ActionKind::Rename, None, now - Duration::minutes(10));
        reg.issue_at("new", ActionKind::Rename, None, now);
        assert_eq!(reg.prune_expired(now), 1);
        assert_eq!(reg.len(), 1);
    }
}
