//! Consent-then-register onboarding through the full dispatch path.
mod common;

use chrono::Utc;
use common::*;
use questbot::storage::UserRecord;

#[tokio::test]
async fn gated_commands_before_onboarding_name_the_next_step() {
    let (bot, _tmp) = test_bot();
    let reply = say(&bot, "c1", "!daily").await;
    assert!(reply.contains("!consent") && reply.contains("!accept"), "{}", reply);
    assert!(bot.store().get_user("c1").unwrap().is_none());
    assert!(bot.store().get_pending_consent("c1").unwrap().is_none());
}

#[tokio::test]
async fn register_without_consent_is_rejected() {
    let (bot, _tmp) = test_bot();
    let reply = say(&bot, "c1", "!register Alice").await;
    assert!(reply.contains("!accept"), "{}", reply);
    assert!(bot.store().get_user("c1").unwrap().is_none());
}

#[tokio::test]
async fn accept_then_register_copies_consent_onto_user() {
    let (bot, _tmp) = test_bot();
    let terms = say(&bot, "c1", "!consent").await;
    assert!(terms.contains("test-v1"));

    say(&bot, "c1", "!accept").await;
    let pending = bot.store().get_pending_consent("c1").unwrap().expect("pending");
    let again = say(&bot, "c1", "!accept").await;
    assert!(again.contains("already accepted"), "{}", again);

    let directive = say(&bot, "c1", "!profile").await;
    assert!(directive.contains("!register"), "{}", directive);

    let welcome = say(&bot, "c1", "!register   Alice   Smith").await;
    assert!(welcome.contains("Alice Smith"), "{}", welcome);

    let user = bot.store().get_user("c1").unwrap().expect("user");
    assert_eq!(user.consent_at, Some(pending.accepted_at));
    assert_eq!(user.consent_version.as_deref(), Some("test-v1"));
    assert!(welcome.contains(&user.friend_code));
    assert!(bot.store().get_pending_consent("c1").unwrap().is_none());

    let profile = say(&bot, "c1", "!me").await;
    assert!(profile.contains("Alice Smith") && profile.contains("Level 1"), "{}", profile);
}

#[tokio::test]
async fn register_requires_a_valid_name() {
    let (bot, _tmp) = test_bot();
    say(&bot, "c1", "!accept").await;
    let usage = say(&bot, "c1", "!register").await;
    assert!(usage.starts_with("Usage"), "{}", usage);
    let reserved = say(&bot, "c1", "!register admin").await;
    assert!(reserved.contains("reserved"), "{}", reserved);
    assert!(bot.store().get_user("c1").unwrap().is_none());
    assert!(bot.store().get_pending_consent("c1").unwrap().is_some());
}

#[tokio::test]
async fn second_registration_is_rejected() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let reply = say(&bot, "c1", "!register Bob").await;
    assert!(reply.contains("already registered"), "{}", reply);
    assert_eq!(bot.store().get_user("c1").unwrap().unwrap().display_name, "Alice");
}

#[tokio::test]
async fn legacy_user_without_consent_must_accept() {
    let (bot, _tmp) = test_bot();
    bot.store()
        .put_user(UserRecord::new("c1", "Legacy", "LEGACY01", Utc::now()))
        .unwrap();

    let blocked = say(&bot, "c1", "!balance").await;
    assert!(blocked.contains("!accept"), "{}", blocked);

    let stamped = say(&bot, "c1", "!accept").await;
    assert!(stamped.contains("all set"), "{}", stamped);
    let user = bot.store().get_user("c1").unwrap().unwrap();
    assert_eq!(user.consent_version.as_deref(), Some("test-v1"));

    let balance = say(&bot, "c1", "!balance").await;
    assert_eq!(balance, "You have 0 coins.");
}

#[tokio::test]
async fn help_lists_more_once_verified() {
    let (bot, _tmp) = test_bot();
    let before = say(&bot, "c1", "!help").await;
    assert!(before.contains("!register") && !before.contains("!daily"), "{}", before);
    onboard(&bot, "c1", "Alice").await;
    let after = say(&bot, "c1", "!help").await;
    assert!(after.contains("!daily") && !after.contains("!grant"), "{}", after);
    let owner = say(&bot, OWNER, "!help").await;
    assert!(owner.contains("!grant"), "{}", owner);
}
