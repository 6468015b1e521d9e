//! Process-wide counters for the event pipeline.
//!
//! Counters are plain atomics plus a per-command map; `questbot status` and the
//! housekeeping log line read them through [`snapshot`].
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

static EVENTS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0);
static GATE_REJECTIONS: AtomicU64 = AtomicU64::new(0);
static HANDLER_FAILURES: AtomicU64 = AtomicU64::new(0);
static TASK_PANICS: AtomicU64 = AtomicU64::new(0);
static LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);

static COMMAND_COUNTERS: OnceLock<Mutex<HashMap<String, CommandCounter>>> = OnceLock::new();

pub fn inc_events_received() {
    EVENTS_RECEIVED.fetch_add(1, Ordering::Relaxed);
}

/// Banned senders and undeliverable replies.
pub fn inc_events_dropped() {
    EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_gate_rejections() {
    GATE_REJECTIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_handler_failures() {
    HANDLER_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_task_panics() {
    TASK_PANICS.fetch_add(1, Ordering::Relaxed);
}

pub fn observe_latency(started: Instant) {
    let ms = started.elapsed().as_millis() as u64;
    LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommandCounter {
    pub invocations: u64,
    pub failures: u64,
}

fn command_counter_lock() -> MutexGuard<'static, HashMap<String, CommandCounter>> {
    COMMAND_COUNTERS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Record one dispatch of `command`; `failed` marks a handler error.
pub fn record_command(command: &str, failed: bool) -> CommandCounter {
    let mut guard = command_counter_lock();
    let counter = guard.entry(command.to_string()).or_default();
    counter.invocations = counter.invocations.saturating_add(1);
    if failed {
        counter.failures = counter.failures.saturating_add(1);
    }
    *counter
}

pub fn command_counters_snapshot() -> HashMap<String, CommandCounter> {
    command_counter_lock().clone()
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub events_received: u64,
    pub events_dropped: u64,
    pub gate_rejections: u64,
    pub handler_failures: u64,
    pub task_panics: u64,
    pub latency_avg_ms: Option<u64>,
}

pub fn snapshot() -> Snapshot {
    let sum = LATENCY_SUM_MS.load(Ordering::Relaxed);
    let count = LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        events_received: EVENTS_RECEIVED.load(Ordering::Relaxed),
        events_dropped: EVENTS_DROPPED.load(Ordering::Relaxed),
        gate_rejections: GATE_REJECTIONS.load(Ordering::Relaxed),
        handler_failures: HANDLER_FAILURES.load(Ordering::Relaxed),
        task_panics: TASK_PANICS.load(Ordering::Relaxed),
        latency_avg_ms: if count > 0 { Some(sum / count) } else { None },
    }
}
