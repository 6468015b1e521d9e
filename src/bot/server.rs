//! Event dispatch loop.
//!
//! Every inbound event runs on its own task. Events for the same chat queue on
//! that chat's lock and run one at a time in arrival order; different chats
//! proceed in parallel. A failing or panicking handler only affects its own
//! event.
use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinSet;

use crate::bot::commands::{CommandProcessor, Dispatch};
use crate::bot::errors::CommandError;
use crate::config::Config;
use crate::logutil::{escape_log, redact_chat_id};
use crate::metrics;
use crate::storage::{BotStore, BotStoreBuilder};
use crate::transport::{InboundEvent, OutboundMessage};

/// How often pending confirmations and idle chat locks are pruned.
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// One async mutex per chat, created on first use.
#[derive(Default)]
pub struct ChatLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChatLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for exclusive access to `chat_id`. Waiters are served FIFO.
    pub async fn acquire(&self, chat_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.map().entry(chat_id.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune_idle(&self) -> usize {
        let mut map = self.map();
        let before = map.len();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct BotServer {
    config: Arc<Config>,
    processor: Arc<CommandProcessor>,
    locks: Arc<ChatLocks>,
    banned: Arc<HashSet<String>>,
}

impl BotServer {
    /// Open the store under `storage.data_dir` and seed the quest catalog.
    pub fn new(config: Config) -> Result<Self> {
        let store = BotStore::open(config.storage.db_path())?;
        let server = Self::with_store(config, store);
        let seeds = server.processor.quest_seeds()?;
        crate::bot::quests::reseed(server.processor.store(), &seeds)?;
        Ok(server)
    }

    /// Build a server around an already opened store (tests, tooling).
    pub fn with_store(config: Config, store: BotStore) -> Self {
        let processor = CommandProcessor::new(&config, Arc::new(store));
        let banned = config.bot.banned.iter().cloned().collect();
        Self {
            config: Arc::new(config),
            processor: Arc::new(processor),
            locks: Arc::new(ChatLocks::default()),
            banned: Arc::new(banned),
        }
    }

    /// Convenience for tests: fresh store at `path` with the default catalog.
    pub fn open_at(config: Config, path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let store = BotStoreBuilder::new(path).open()?;
        Ok(Self::with_store(config, store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    pub fn store(&self) -> &BotStore {
        self.processor.store()
    }

    pub fn chat_locks(&self) -> &ChatLocks {
        &self.locks
    }

    /// Run one event to completion and return the reply, if any.
    pub async fn handle_event(&self, event: &InboundEvent) -> Option<OutboundMessage> {
        metrics::inc_events_received();
        let sender = event.sender();
        if self.banned.contains(sender) {
            metrics::inc_events_dropped();
            warn!(target: "security", "Dropped event from banned sender {}", redact_chat_id(sender));
            return None;
        }

        let started = Instant::now();
        let _guard = self.locks.acquire(&event.chat_id).await;
        let dispatch = self.processor.execute(&event.chat_id, sender, &event.text, Utc::now());
        let reply = match dispatch {
            Dispatch::Ignored => return None,
            Dispatch::Unknown(hint) => hint,
            Dispatch::Handled { command, result } => {
                metrics::record_command(command.name(), matches!(result, Err(CommandError::Store(_))));
                match result {
                    Ok(text) => {
                        debug!("{} {} ok", redact_chat_id(&event.chat_id), command.name());
                        text
                    }
                    Err(e) => {
                        self.log_failure(event, command.name(), &e);
                        e.user_message()
                    }
                }
            }
        };
        metrics::observe_latency(started);
        Some(OutboundMessage {
            chat_id: event.chat_id.clone(),
            text: reply,
        })
    }

    fn log_failure(&self, event: &InboundEvent, command: &str, err: &CommandError) {
        match err {
            CommandError::Store(e) => {
                metrics::inc_handler_failures();
                error!(
                    "{} failed for {}: {} (text: {})",
                    command,
                    redact_chat_id(&event.chat_id),
                    e,
                    escape_log(&event.text)
                );
            }
            CommandError::Unauthorized => warn!(
                target: "security",
                "Unauthorized {} from {}",
                command,
                redact_chat_id(event.sender())
            ),
            other => debug!("{} rejected for {}: {}", command, redact_chat_id(&event.chat_id), other.kind()),
        }
    }

    /// Prune expired confirmations and idle chat locks.
    pub fn housekeeping(&self) {
        let expired = self.processor.pending_actions().prune_expired(Utc::now());
        let idle = self.locks.prune_idle();
        if expired > 0 || idle > 0 {
            debug!("Housekeeping: {} expired confirmations, {} idle chat locks", expired, idle);
        }
        let snap = metrics::snapshot();
        debug!(
            "Metrics: events={} dropped={} gated={} failures={} panics={} avg_latency_ms={:?}",
            snap.events_received,
            snap.events_dropped,
            snap.gate_rejections,
            snap.handler_failures,
            snap.task_panics,
            snap.latency_avg_ms
        );
        let mut counters: Vec<_> = metrics::command_counters_snapshot().into_iter().collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, c) in counters {
            debug!("  {}: {} calls, {} failures", name, c.invocations, c.failures);
        }
    }

    /// Dispatch events from `inbound` until it closes or Ctrl-C, sending replies
    /// to `outbound`. In-flight events are allowed to finish before returning.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<InboundEvent>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Result<()> {
        info!("{} started", self.config.bot.name);
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = inbound.recv() => {
                    let Some(event) = event else {
                        info!("Inbound channel closed");
                        break;
                    };
                    let server = self.clone();
                    let out = outbound.clone();
                    tasks.spawn(async move {
                        if let Some(reply) = server.handle_event(&event).await {
                            if out.send(reply).await.is_err() {
                                metrics::inc_events_dropped();
                                warn!("Reply for {} dropped: outbound closed", redact_chat_id(&event.chat_id));
                            }
                        }
                    });
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        metrics::inc_task_panics();
                        error!("Event task failed: {}", e);
                    }
                }

                _ = ticker.tick() => {
                    self.housekeeping();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                metrics::inc_task_panics();
                error!("Event task failed during shutdown: {}", e);
            }
        }
        let snap = metrics::snapshot();
        info!(
            "Stopped: {} events, {} dropped, {} gate rejections, {} failures",
            snap.events_received, snap.events_dropped, snap.gate_rejections, snap.handler_failures
        );
        Ok(())
    }
}
