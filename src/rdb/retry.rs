//! Reconnect-aware retry loop for driver operations. The backoff schedule
//! comes from `backon`; retry eligibility comes from the substring
//! classifier on [`GatewayError`].

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{GatewayError, IsRetryable};

fn backoff() -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(3)
        .build()
}

/// Runs `op`, retrying retryable failures up to three times with
/// exponential backoff (100 ms to 2 s), reconnecting before each retry.
/// Non-retryable errors short-circuit; a failed reconnect is logged and the
/// attempt proceeds on whatever handle is installed.
pub(crate) async fn retry_with_reconnect<'a, T>(
    op_name: &str,
    mut op: impl FnMut() -> BoxFuture<'a, Result<T, GatewayError>>,
    mut reconnect: impl FnMut() -> BoxFuture<'a, Result<(), GatewayError>>,
) -> Result<T, GatewayError> {
    let mut delays = backoff();
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(op = op_name, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() => {
                let Some(delay) = delays.next() else {
                    warn!(op = op_name, %err, "retries exhausted");
                    return Err(err);
                };
                attempt += 1;
                warn!(op = op_name, attempt, delay_ms = delay.as_millis() as u64, %err,
                    "retryable backend error, reconnecting");
                tokio::time::sleep(delay).await;
                if let Err(reconnect_err) = reconnect().await {
                    warn!(op = op_name, %reconnect_err, "reconnect failed");
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_and_reconnects() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let reconnects = Arc::new(AtomicUsize::new(0));

        let a = attempts.clone();
        let r = reconnects.clone();
        let result = retry_with_reconnect(
            "test",
            move || {
                let a = a.clone();
                Box::pin(async move {
                    if a.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(GatewayError::Backend("connection refused".to_string()))
                    } else {
                        Ok(42)
                    }
                })
            },
            move || {
                let r = r.clone();
                Box::pin(async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(reconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_short_circuit() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let a = attempts.clone();
        let result: Result<(), _> = retry_with_reconnect(
            "test",
            move || {
                let a = a.clone();
                Box::pin(async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::Sql("syntax error".to_string()))
                })
            },
            || Box::pin(async { Ok(()) }),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_backoff_is_exhausted() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let a = attempts.clone();
        let result: Result<(), _> = retry_with_reconnect(
            "test",
            move || {
                let a = a.clone();
                Box::pin(async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::Backend("broken pipe".to_string()))
                })
            },
            || Box::pin(async { Ok(()) }),
        )
        .await;

        assert!(result.is_err());
        // Initial attempt plus three retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
