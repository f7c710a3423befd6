use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    polls: AtomicU64,
    successes: AtomicU64,
    timeouts: AtomicU64,
    cancelled: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_poll() {
    increment(&COUNTERS.polls);
}

pub fn record_success() {
    increment(&COUNTERS.successes);
}

pub fn record_timeout() {
    increment(&COUNTERS.timeouts);
}

pub fn record_cancelled() {
    increment(&COUNTERS.cancelled);
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetryMetricsSnapshot {
    pub polls: u64,
    pub successes: u64,
    pub timeouts: u64,
    pub cancelled: u64,
}

pub fn snapshot() -> RetryMetricsSnapshot {
    RetryMetricsSnapshot {
        polls: COUNTERS.polls.load(Ordering::Relaxed),
        successes: COUNTERS.successes.load(Ordering::Relaxed),
        timeouts: COUNTERS.timeouts.load(Ordering::Relaxed),
        cancelled: COUNTERS.cancelled.load(Ordering::Relaxed),
    }
}
