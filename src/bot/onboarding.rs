//! Consent-then-register onboarding.
//!
//! ```text
//!  NoRecord ──accept──▶ ConsentPending ──register──▶ Verified
//!                                                       ▲
//!  RegisteredNoConsent ─────────accept──────────────────┘
//! ```
//!
//! The state is derived on every message from the user row and the pending
//! consent row; nothing caches it. `RegisteredNoConsent` only exists for rows
//! written before consent was required (or by external tooling).
use chrono::{DateTime, Utc};
use log::info;

use crate::bot::errors::CommandError;
use crate::bot::pending::random_code;
use crate::logutil::redact_chat_id;
use crate::storage::{BotStore, PendingConsent, RegistrationOutcome, StoreError, UserRecord};
use crate::validation::{validate_display_name, FRIEND_CODE_LEN};

#[derive(Debug, Clone, PartialEq)]
pub enum OnboardingState {
    NoRecord,
    ConsentPending(PendingConsent),
    RegisteredNoConsent(UserRecord),
    Verified(UserRecord),
}

impl OnboardingState {
    pub fn load(store: &BotStore, chat_id: &str) -> Result<Self, StoreError> {
        if let Some(user) = store.get_user(chat_id)? {
            return Ok(if user.has_consent() {
                OnboardingState::Verified(user)
            } else {
                OnboardingState::RegisteredNoConsent(user)
            });
        }
        Ok(match store.get_pending_consent(chat_id)? {
            Some(consent) => OnboardingState::ConsentPending(consent),
            None => OnboardingState::NoRecord,
        })
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, OnboardingState::Verified(_))
    }

    pub fn verified_user(&self) -> Option<&UserRecord> {
        match self {
            OnboardingState::Verified(user) => Some(user),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OnboardingState::NoRecord => "no_record",
            OnboardingState::ConsentPending(_) => "consent_pending",
            OnboardingState::RegisteredNoConsent(_) => "registered_no_consent",
            OnboardingState::Verified(_) => "verified",
        }
    }

    /// What the user must do next. `None` once verified.
    pub fn directive(&self, prefix: &str) -> Option<String> {
        match self {
            OnboardingState::NoRecord => Some(format!(
                "Welcome! Read the terms with {p}consent, then send {p}accept to continue.",
                p = prefix
            )),
            OnboardingState::ConsentPending(_) => Some(format!(
                "Almost there. Pick a name with {}register <name>.",
                prefix
            )),
            OnboardingState::RegisteredNoConsent(_) => Some(format!(
                "Our terms need your consent. Read them with {p}consent, then send {p}accept.",
                p = prefix
            )),
            OnboardingState::Verified(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsentOutcome {
    /// A pending consent was written; registration comes next.
    Recorded,
    AlreadyPending,
    /// A legacy user row was stamped and is now verified.
    StampedExisting(UserRecord),
    AlreadyVerified,
}

/// Record acceptance of consent `version` for `chat_id`.
pub fn accept_consent(
    store: &BotStore,
    state: &OnboardingState,
    chat_id: &str,
    version: &str,
    now: DateTime<Utc>,
) -> Result<ConsentOutcome, StoreError> {
    match state {
        OnboardingState::NoRecord => {
            store.put_pending_consent(&PendingConsent {
                chat_id: chat_id.to_string(),
                accepted_at: now,
                version: version.to_string(),
            })?;
            info!("Consent {} accepted by {}", version, redact_chat_id(chat_id));
            Ok(ConsentOutcome::Recorded)
        }
        OnboardingState::ConsentPending(_) => Ok(ConsentOutcome::AlreadyPending),
        OnboardingState::RegisteredNoConsent(_) => {
            let user = store.update_user(chat_id, |u| -> Result<UserRecord, StoreError> {
                u.consent_at = Some(now);
                u.consent_version = Some(version.to_string());
                Ok(u.clone())
            })?;
            info!("Consent {} stamped on existing user {}", version, redact_chat_id(chat_id));
            Ok(ConsentOutcome::StampedExisting(user))
        }
        OnboardingState::Verified(_) => Ok(ConsentOutcome::AlreadyVerified),
    }
}

/// Register `raw_name` for a chat whose consent is pending.
pub fn register(
    store: &BotStore,
    state: &OnboardingState,
    chat_id: &str,
    raw_name: &str,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<UserRecord, CommandError> {
    match state {
        OnboardingState::NoRecord => {
            return Err(CommandError::state(format!(
                "Please accept the terms first: read {p}consent, then send {p}accept.",
                p = prefix
            )))
        }
        OnboardingState::RegisteredNoConsent(_) => {
            return Err(CommandError::state(format!(
                "You're already registered. Send {}accept to finish.",
                prefix
            )))
        }
        OnboardingState::Verified(_) => {
            return Err(CommandError::state("You're already registered."))
        }
        OnboardingState::ConsentPending(_) => {}
    }

    let name = validate_display_name(raw_name).map_err(|e| CommandError::validation(e.to_string()))?;
    match store.complete_registration(chat_id, &name, now, || random_code(FRIEND_CODE_LEN))? {
        RegistrationOutcome::Registered(user) => {
            info!("Registered {} as '{}'", redact_chat_id(chat_id), user.display_name);
            Ok(user)
        }
        RegistrationOutcome::AlreadyRegistered => Err(CommandError::state("You're already registered.")),
        RegistrationOutcome::MissingConsent => Err(CommandError::state(format!(
            "Please accept the terms first with {}accept.",
            prefix
        ))),
    }
}
