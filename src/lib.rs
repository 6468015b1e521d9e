//! # Questbot - Chat Bot with Onboarding, Economy and Quests
//!
//! Questbot is the backend of a chat bot. Users consent to its terms, register
//! a display name, and then earn coins and XP through daily and weekly bonuses
//! and quests, add each other as friends, and manage their account.
//!
//! ## Features
//!
//! - **Onboarding**: consent first, then registration; every other command is gated on both.
//! - **Economy**: levels and rank titles derived from XP, daily streaks, ISO-week bonuses.
//! - **Quests**: daily, weekly, monthly and progress quests with exactly-once claims.
//! - **Friends**: symmetric friendships created by redeeming friend codes.
//! - **Confirmations**: short-lived codes guard account deletion and renames.
//! - **Per-chat ordering**: events for one chat never interleave; chats run in parallel.
//! - **Persistence**: sled trees with bincode records and multi-tree transactions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use questbot::bot::BotServer;
//! use questbot::config::Config;
//! use questbot::transport::InboundEvent;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = BotServer::new(config)?;
//!     let reply = server.handle_event(&InboundEvent::direct("chat-1", "!help")).await;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bot`] - command routing, onboarding, economy, quests, friends, dispatch loop
//! - [`storage`] - sled persistence layer and quest catalog seeds
//! - [`transport`] - inbound/outbound event types and the JSON-lines stdio transport
//! - [`config`] - TOML configuration
//! - [`validation`] - display name, prefix and friend code validation
//! - [`metrics`] - process-wide counters
//! - [`logutil`] - single-line log escaping
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Transport     │ ← stdio JSON lines (or any channel pair)
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   BotServer     │ ← per-chat locks, handlers, housekeeping
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   BotStore      │ ← sled trees
//! └─────────────────┘
//! ```

pub mod bot;
pub mod config;
pub mod logutil;
pub mod metrics;
pub mod storage;
pub mod transport;
pub mod validation;
