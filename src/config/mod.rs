//! # Configuration Management Module
//!
//! Typed TOML configuration for the bot, with defaults for every section so
//! `questbot init` can write a working file.
//!
//! ## Configuration Structure
//!
//! - [`BotConfig`] - identity, default prefix, privileged and banned senders, consent terms
//! - [`RewardsConfig`] - reward multiplier policy for privileged senders
//! - [`ConfirmationConfig`] - confirmation token lifetime and rename cooldown
//! - [`StorageConfig`] - data directory and optional quest seed file
//! - [`LoggingConfig`] - log level and log file locations
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bot]
//! name = "Questbot"
//! default_prefix = "!"
//! privileged = ["15550001111@c.us"]
//! banned = []
//! consent_version = "2024-06"
//! terms = "We store your chat id, display name and game progress."
//!
//! [rewards]
//! privileged_multiplier = 2
//!
//! [confirmations]
//! token_ttl_seconds = 120
//! name_change_cooldown_days = 7
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "questbot.log"
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questbot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Bot: {}", config.bot.name);
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use crate::validation::validate_prefix;

/// Prefix used when neither the chat nor the config supplies a valid one.
pub const FALLBACK_PREFIX: &str = "!";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    /// Command prefix for chats that never set their own. At most 3 characters.
    pub default_prefix: String,
    /// Sender identities granted owner role, owner commands and the reward multiplier.
    #[serde(default)]
    pub privileged: Vec<String>,
    /// Sender identities whose events are dropped before routing.
    #[serde(default)]
    pub banned: Vec<String>,
    /// Version stamped onto every consent record.
    pub consent_version: String,
    /// Text shown by the consent command.
    pub terms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Factor applied to coin and XP grants for privileged senders.
    #[serde(default = "default_privileged_multiplier")]
    pub privileged_multiplier: u32,
}

fn default_privileged_multiplier() -> u32 {
    2
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            privileged_multiplier: default_privileged_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    #[serde(default = "default_name_change_cooldown_days")]
    pub name_change_cooldown_days: i64,
}

fn default_token_ttl_seconds() -> u64 {
    120
}

fn default_name_change_cooldown_days() -> i64 {
    7
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl_seconds(),
            name_change_cooldown_days: default_name_change_cooldown_days(),
        }
    }
}

impl ConfirmationConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds.max(1))
    }

    pub fn name_change_cooldown(&self) -> chrono::Duration {
        chrono::Duration::days(self.name_change_cooldown_days.max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// JSON quest catalog; the built-in catalog is used when unset.
    #[serde(default)]
    pub quest_seed_file: Option<String>,
}

impl StorageConfig {
    /// Directory holding the sled database.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("questbot")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub confirmations: ConfirmationConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// The configured default prefix, or [`FALLBACK_PREFIX`] if it fails validation.
    pub fn default_prefix(&self) -> String {
        validate_prefix(&self.bot.default_prefix).unwrap_or_else(|_| FALLBACK_PREFIX.to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bot: BotConfig {
                name: "Questbot".to_string(),
                default_prefix: FALLBACK_PREFIX.to_string(),
                privileged: Vec::new(),
                banned: Vec::new(),
                consent_version: "1".to_string(),
                terms: "We store your chat id, chosen display name, coins, XP, quest progress and friend list \
                        so the game can work. Send the delete command at any time to erase it all."
                    .to_string(),
            },
            rewards: RewardsConfig::default(),
            confirmations: ConfirmationConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                quest_seed_file: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("questbot.log".to_string()),
                security_file: Some("questbot-security.log".to_string()),
            },
        }
    }
}
