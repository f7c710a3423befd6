use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use trellis_core_types::{EngineError, EngineResult};

use crate::context::RetryContext;
use crate::metrics;

/// Invoke `check` until it succeeds, the deadline passes or `ctx` is cancelled.
///
/// Retryable failures are remembered and the loop sleeps for
/// `min(interval, remaining)` before the next attempt. The last attempt
/// therefore runs at or after the deadline, and the resulting
/// [`EngineError::Timeout`] wraps the failure that attempt produced.
/// Non-retryable failures are returned as-is on first sight.
pub async fn retry_until<T, F, Fut>(
    ctx: &RetryContext,
    operation: &str,
    mut check: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut attempts: u32 = 0;
    loop {
        if ctx.is_cancelled() {
            metrics::record_cancelled();
            return Err(EngineError::Cancelled(format!(
                "{operation} cancelled after {attempts} attempt(s)"
            )));
        }

        attempts += 1;
        metrics::record_poll();

        let failure = match check().await {
            Ok(value) => {
                metrics::record_success();
                debug!(operation, attempts, elapsed_ms = ctx.elapsed_ms(), "retry check passed");
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                debug!(operation, attempts, error = %err, "retry check failed permanently");
                return Err(err);
            }
            Err(err) => err,
        };

        let remaining = ctx.remaining_time();
        if remaining.is_zero() {
            metrics::record_timeout();
            warn!(
                operation,
                attempts,
                waited_ms = ctx.elapsed_ms(),
                last = %failure,
                "retry window elapsed"
            );
            return Err(EngineError::timeout(operation, ctx.elapsed_ms(), failure));
        }

        trace!(operation, attempts, error = %failure, "retrying");
        let delay = ctx.interval().min(remaining);
        tokio::select! {
            _ = ctx.cancel_token().cancelled() => {
                metrics::record_cancelled();
                return Err(EngineError::Cancelled(format!(
                    "{operation} cancelled while retrying; last failure: {failure}"
                )));
            }
            _ = sleep(delay) => {}
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> EngineResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Cancelled("wait interrupted".to_string())),
        _ = sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn ctx(timeout_ms: u64, interval_ms: u64) -> RetryContext {
        RetryConfig::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
        .start(CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn returns_value_once_check_passes() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let ctx = ctx(1000, 10);
        let value = retry_until(&ctx, "count", || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(EngineError::assertion("3 attempts", format!("{n} so far")))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wraps_most_recent_failure() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let ctx = ctx(100, 30);
        let err = retry_until(&ctx, "should", || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(EngineError::assertion("ready", format!("attempt {n}")))
        })
        .await
        .unwrap_err();

        let total = attempts.load(Ordering::SeqCst);
        match err {
            EngineError::Timeout {
                operation,
                waited_ms,
                last,
            } => {
                assert_eq!(operation, "should");
                assert!(waited_ms >= 100);
                assert_eq!(
                    last.to_string(),
                    format!("expected ready, but attempt {}", total - 1)
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_fail_before_window_elapses() {
        let ctx = ctx(500, 50);
        let start = tokio::time::Instant::now();
        let _ = retry_until(&ctx, "never", || async {
            Err::<(), _>(EngineError::NotFound {
                selector: "x".into(),
            })
        })
        .await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn structural_failure_is_not_retried() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let ctx = ctx(1000, 10);
        let err = retry_until(&ctx, "alias", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(EngineError::AliasNotFound("missing".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), "alias_not_found");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_loop_within_one_interval() {
        let token = CancellationToken::new();
        let ctx = RetryConfig::new(Duration::from_secs(60), Duration::from_millis(50))
            .start(token.clone());
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();

        let handle = tokio::spawn(async move {
            retry_until(&ctx, "spin", || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(EngineError::NotFound {
                        selector: "never".into(),
                    })
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        token.cancel();
        let started = tokio::time::Instant::now();
        let err = handle.await.unwrap().unwrap_err();
        assert!(started.elapsed() <= Duration::from_millis(50));
        assert!(err.is_cancelled());
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_interruptible() {
        let token = CancellationToken::new();
        token.cancel();
        let err = pause(Duration::from_secs(5), &token).await.unwrap_err();
        assert!(err.is_cancelled());
        pause(Duration::from_millis(5), &CancellationToken::new())
            .await
            .unwrap();
    }
}
