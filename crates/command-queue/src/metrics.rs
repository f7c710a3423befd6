use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

pub fn record_enqueued() {
    add(&COUNTERS.enqueued, 1);
}

pub fn record_started() {
    add(&COUNTERS.started, 1);
}

pub fn record_completed() {
    add(&COUNTERS.completed, 1);
}

pub fn record_failed() {
    add(&COUNTERS.failed, 1);
}

/// Commands dropped because an earlier command of the same test failed.
pub fn record_discarded(count: usize) {
    add(&COUNTERS.discarded, count as u64);
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct QueueMetricsSnapshot {
    pub enqueued: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
}

pub fn snapshot() -> QueueMetricsSnapshot {
    QueueMetricsSnapshot {
        enqueued: COUNTERS.enqueued.load(Ordering::Relaxed),
        started: COUNTERS.started.load(Ordering::Relaxed),
        completed: COUNTERS.completed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        discarded: COUNTERS.discarded.load(Ordering::Relaxed),
    }
}
