//! Quest listing, event progress and exactly-once claims.
mod common;

use common::*;
use questbot::storage::QuestStatus;

#[tokio::test]
async fn daily_bonus_completes_the_daily_quest() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let quest = bot.store().get_quest_by_key("daily_checkin").unwrap().unwrap();

    let listing = say(&bot, "c1", "!quests").await;
    assert!(listing.starts_with("Daily quests:"), "{}", listing);
    assert!(listing.contains(&format!("#{} Claim your daily bonus: 0/1", quest.id)), "{}", listing);

    let daily = say(&bot, "c1", "!daily").await;
    assert!(daily.contains(&format!("!claim {}", quest.id)), "{}", daily);

    let listing = say(&bot, "c1", "!quests daily").await;
    assert!(listing.contains("ready!"), "{}", listing);

    let before = bot.store().get_user("c1").unwrap().unwrap();
    let claimed = say(&bot, "c1", &format!("!claim {}", quest.id)).await;
    assert!(claimed.starts_with(&format!("Claimed #{}", quest.id)), "{}", claimed);
    let after = bot.store().get_user("c1").unwrap().unwrap();
    assert_eq!(after.balance, before.balance + quest.reward_coins);
    assert_eq!(after.xp, before.xp + quest.reward_xp);

    let again = say(&bot, "c1", &format!("!claim #{}", quest.id)).await;
    assert!(again.contains("already claimed"), "{}", again);
    assert_eq!(bot.store().get_user("c1").unwrap().unwrap().balance, after.balance);

    let row = bot.store().get_user_quest("c1", quest.id).unwrap().unwrap();
    assert_eq!(row.status(), QuestStatus::Claimed);
}

#[tokio::test]
async fn incomplete_and_unknown_quests() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let weekly = bot.store().get_quest_by_key("weekly_checkin").unwrap().unwrap();

    let not_done = say(&bot, "c1", &format!("!claim {}", weekly.id)).await;
    assert!(not_done.contains("isn't complete yet (0/1)"), "{}", not_done);

    let unknown = say(&bot, "c1", "!claim 987654").await;
    assert!(unknown.contains("no quest #987654"), "{}", unknown);

    let bad = say(&bot, "c1", "!claim abc").await;
    assert!(bad.starts_with("Usage"), "{}", bad);
    assert_eq!(bot.store().get_user("c1").unwrap().unwrap().balance, 0);
}

#[tokio::test]
async fn level_quests_complete_from_snapshots() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    say_as(&bot, OWNER, OWNER, "!grant c1 0 4500").await;
    let quest = bot.store().get_quest_by_key("reach_level_5").unwrap().unwrap();

    let listing = say(&bot, "c1", "!quests progress").await;
    assert!(listing.starts_with("Progress quests:"), "{}", listing);
    assert!(listing.contains(&format!("#{} Reach level 5: ready!", quest.id)), "{}", listing);

    let claimed = say(&bot, "c1", &format!("!claim {}", quest.id)).await;
    assert!(claimed.contains(&format!("+{} coins", quest.reward_coins)), "{}", claimed);
}

#[tokio::test]
async fn friend_quests_complete_after_redeeming() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let bob = onboard(&bot, "c2", "Bob").await;
    say(&bot, "c1", &format!("!friend {}", bob.friend_code)).await;
    let quest = bot.store().get_quest_by_key("first_friend").unwrap().unwrap();

    // Claiming refreshes snapshot progress, so no listing is needed first.
    let claimed = say(&bot, "c2", &format!("!claim {}", quest.id)).await;
    assert!(claimed.starts_with("Claimed"), "{}", claimed);
}

#[tokio::test]
async fn bad_period_gets_usage() {
    let (bot, _tmp) = test_bot();
    onboard(&bot, "c1", "Alice").await;
    let reply = say(&bot, "c1", "!quests yearly").await;
    assert!(reply.starts_with("Usage"), "{}", reply);
    let monthly = say(&bot, "c1", "!quests m").await;
    assert!(monthly.starts_with("Monthly quests:"), "{}", monthly);
}

#[tokio::test]
async fn owner_reseed_reports_counts() {
    let (bot, _tmp) = test_bot();
    let reply = say(&bot, OWNER, "!reseed").await;
    assert!(reply.contains("0 new") && reply.contains("0 retired"), "{}", reply);
    let denied = say(&bot, "c1", "!reseed").await;
    assert_eq!(denied, "You don't have access to that command.");
}
