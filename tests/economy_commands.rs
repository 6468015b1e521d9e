//! Daily/weekly bonuses, leveling and the owner grant command.
mod common;

use chrono::{Duration, Utc};
use common::*;
use questbot::bot::CommandError;
use questbot::storage::LevelRole;

#[tokio::test]
async fn daily_bonus_once_per_day() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;

    let first = say(&bot, "c1", "!daily").await;
    assert!(first.starts_with("Daily bonus: +120 coins, +30 XP. Streak: 1 day."), "{}", first);

    let second = say(&bot, "c1", "!daily").await;
    assert!(second.contains("already claimed"), "{}", second);
    let user = bot.store().get_user("c1").unwrap().unwrap();
    assert_eq!(user.balance, 120);
    assert_eq!(user.xp, 30);
}

#[tokio::test]
async fn streak_continues_from_yesterday() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let yesterday = (Utc::now() - Duration::days(1)).date_naive();
    bot.store()
        .update_user("c1", |u| -> Result<(), CommandError> {
            u.last_daily = Some(yesterday);
            u.daily_streak = 4;
            Ok(())
        })
        .unwrap();

    let reply = say(&bot, "c1", "!daily").await;
    assert!(reply.starts_with("Daily bonus: +200 coins, +50 XP. Streak: 5 days."), "{}", reply);
}

#[tokio::test]
async fn streak_resets_after_a_gap() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let long_ago = (Utc::now() - Duration::days(3)).date_naive();
    bot.store()
        .update_user("c1", |u| -> Result<(), CommandError> {
            u.last_daily = Some(long_ago);
            u.daily_streak = 9;
            Ok(())
        })
        .unwrap();

    say(&bot, "c1", "!daily").await;
    assert_eq!(bot.store().get_user("c1").unwrap().unwrap().daily_streak, 1);
}

#[tokio::test]
async fn weekly_bonus_once_per_week() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let first = say(&bot, "c1", "!weekly").await;
    assert!(first.starts_with("Weekly bonus: +500 coins, +200 XP."), "{}", first);
    let second = say(&bot, "c1", "!weekly").await;
    assert!(second.contains("already claimed the weekly bonus"), "{}", second);
    assert_eq!(bot.store().get_user("c1").unwrap().unwrap().balance, 500);
}

#[tokio::test]
async fn privileged_rewards_are_doubled_silently() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, OWNER, "Boss").await;
    let reply = say(&bot, OWNER, "!daily").await;
    assert!(reply.starts_with("Daily bonus: +240 coins, +60 XP."), "{}", reply);
    assert!(!reply.contains("x2") && !reply.to_lowercase().contains("multiplier"));
    let profile = say(&bot, OWNER, "!profile").await;
    assert!(profile.contains("Role: owner"), "{}", profile);
}

#[tokio::test]
async fn grant_levels_up_and_updates_rank() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let reply = say_as(&bot, OWNER, OWNER, "!grant c1 50 10000").await;
    assert!(reply.contains("level 11 (Pro)"), "{}", reply);
    let user = bot.store().get_user("c1").unwrap().unwrap();
    assert_eq!(user.balance, 50);
    assert_eq!(user.level, 11);
    assert_eq!(user.level_role, LevelRole::Pro);

    let missing = say_as(&bot, OWNER, OWNER, "!grant nobody 1 1").await;
    assert!(missing.contains("No user"), "{}", missing);
    let usage = say_as(&bot, OWNER, OWNER, "!grant c1 lots 1").await;
    assert!(usage.starts_with("Usage"), "{}", usage);
}

#[tokio::test]
async fn non_owner_grant_is_refused_without_detail() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let reply = say(&bot, "c1", "!grant c1 1000 1000").await;
    assert_eq!(reply, "You don't have access to that command.");
    assert_eq!(bot.store().get_user("c1").unwrap().unwrap().balance, 0);
}

#[tokio::test]
async fn leaderboard_orders_by_xp() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    onboard(&bot, "c2", "Bob").await;
    say_as(&bot, OWNER, OWNER, "!grant c2 0 5000").await;
    let top = say(&bot, "c1", "!top").await;
    let bob = top.find("Bob").expect("bob listed");
    let alice = top.find("Alice").expect("alice listed");
    assert!(bob < alice, "{}", top);
    assert!(top.contains("Alice - level 1, 0 XP (you)"), "{}", top);
}
