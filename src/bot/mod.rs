//! # Bot Core Module
//!
//! Chat command handling for the quest bot.
//!
//! ## Components
//!
//! - [`server`] - event loop, per-chat serialization and housekeeping
//! - [`router`] - prefix parsing, command table and onboarding gates
//! - [`commands`] - one handler per command
//! - [`onboarding`] - consent-then-register state machine
//! - [`economy`] - XP, levels, ranks, daily and weekly bonuses
//! - [`quests`] - quest progress, listing and claims
//! - [`pending`] - confirmation tokens for destructive commands
//! - [`roles`] - privileged identities and stored-role healing
//! - [`friends`] - friend-code redemption and listing
//!
//! ## Flow
//!
//! ```text
//! InboundEvent ─▶ BotServer (ban check, chat lock)
//!                   └─▶ CommandProcessor
//!                         ├─ resolve prefix + command
//!                         ├─ OnboardingState::load + gate
//!                         ├─ roles::recompute
//!                         └─ handler ─▶ reply text
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questbot::bot::BotServer;
//! use questbot::config::Config;
//! use questbot::transport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = BotServer::new(config)?;
//!     let (inbound, outbound) = transport::spawn_stdio();
//!     server.run(inbound, outbound).await
//! }
//! ```

pub mod commands;
pub mod economy;
pub mod errors;
pub mod friends;
pub mod onboarding;
pub mod pending;
pub mod quests;
pub mod roles;
pub mod router;
pub mod server;

pub use commands::{CommandProcessor, Dispatch};
pub use errors::CommandError;
pub use server::{BotServer, ChatLocks};
