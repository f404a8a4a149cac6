//! Bounded retry for co-signer calls.

use keyward_core::effects::{CosignerError, PhysicalTimeEffects};
use keyward_core::RetryConfig;
use std::future::Future;

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of attempts. Backoff sleeps go through the time effect.
pub async fn with_retry<T, F, Fut, C>(
    time: &C,
    config: &RetryConfig,
    op_name: &'static str,
    mut op: F,
) -> Result<T, CosignerError>
where
    C: PhysicalTimeEffects + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CosignerError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = config.delay_before(attempt + 1);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "co-signer call failed, retrying"
                );
                if time.sleep_ms(delay.as_millis() as u64).await.is_err() {
                    return Err(err);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_testkit::MockTimeHandler;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn retries_network_errors_with_backoff() {
        let time = MockTimeHandler::default();
        let start = time.now();
        let calls = AtomicU32::new(0);

        let result = with_retry(&time, &config(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CosignerError::network("down"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms before attempt 2, 200ms before attempt 3
        assert_eq!(start.until(time.now()), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let time = MockTimeHandler::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&time, &config(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CosignerError::network("down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_authorization_failures() {
        let time = MockTimeHandler::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&time, &config(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CosignerError::unauthorized("stale"))
        })
        .await;
        assert_eq!(result, Err(CosignerError::unauthorized("stale")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
