use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Smallest polling interval; a zero interval would never yield.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timeout and polling cadence used to build fresh [`RetryContext`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(4000),
            interval: Duration::from_millis(50),
        }
    }
}

impl RetryConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a context whose deadline is `timeout` from now.
    pub fn start(&self, cancel: CancellationToken) -> RetryContext {
        RetryContext::new(self.timeout, self.interval, cancel)
    }
}

/// Deadline, polling interval and cancellation for one retry-bounded operation.
#[derive(Clone, Debug)]
pub struct RetryContext {
    started_at: Instant,
    deadline: Instant,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl RetryContext {
    pub fn new(timeout: Duration, interval: Duration, cancel_token: CancellationToken) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            deadline: started_at + timeout,
            interval: interval.max(MIN_INTERVAL),
            cancel_token,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if this context has exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get remaining time until deadline
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed_ms(&self) -> u64 {
        Instant::now()
            .saturating_duration_since(self.started_at)
            .as_millis() as u64
    }
}
