//! Test utilities & fixtures.
//! Builds throwaway bots backed by a temp-dir store and helpers to talk to them.
#![allow(dead_code)]

use questbot::bot::BotServer;
use questbot::config::Config;
use questbot::storage::UserRecord;
use questbot::transport::InboundEvent;

pub const OWNER: &str = "owner@c.us";
pub const BANNED: &str = "spammer@c.us";

/// Config with `!` prefix, one privileged identity and one banned sender.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.bot.privileged = vec![OWNER.to_string()];
    config.bot.banned = vec![BANNED.to_string()];
    config.bot.consent_version = "test-v1".to_string();
    config.logging.file = None;
    config.logging.security_file = None;
    config
}

/// A bot with the default quest catalog. Keep the `TempDir` alive for the test.
pub fn test_bot() -> (BotServer, tempfile::TempDir) {
    test_bot_with(test_config())
}

pub fn test_bot_with(config: Config) -> (BotServer, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let server = BotServer::open_at(config, tmp.path().join("db")).expect("server");
    (server, tmp)
}

/// Send `text` in a direct chat and return the reply text ("" when ignored).
pub async fn say(bot: &BotServer, chat: &str, text: &str) -> String {
    say_as(bot, chat, chat, text).await
}

pub async fn say_as(bot: &BotServer, chat: &str, sender: &str, text: &str) -> String {
    bot.handle_event(&InboundEvent::new(chat, sender, text))
        .await
        .map(|m| m.text)
        .unwrap_or_default()
}

/// Consent and register `chat` under `name`; returns the stored user.
pub async fn onboard(bot: &BotServer, chat: &str, name: &str) -> UserRecord {
    let accepted = say(bot, chat, "!accept").await;
    assert!(accepted.contains("register"), "accept reply: {}", accepted);
    let registered = say(bot, chat, &format!("!register {}", name)).await;
    assert!(registered.starts_with("Welcome"), "register reply: {}", registered);
    bot.store().get_user(chat).expect("get").expect("registered user")
}

/// Pull the confirmation code out of a "send !confirmX CODE within" reply.
pub fn extract_token(reply: &str, command: &str) -> String {
    let marker = format!("{} ", command);
    let start = reply.find(&marker).expect("confirmation command in reply") + marker.len();
    reply[start..].split_whitespace().next().expect("token").to_string()
}
