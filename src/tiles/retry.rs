use crate::prelude::{Duration, Future};
use crate::runtime::async_delay;
use crate::Result;

/// Runs `operation` up to `max_attempts` times with linear backoff.
///
/// After failed attempt `n` the helper waits `base_delay * n` before trying
/// again, so the delays run `base, 2·base, ...`; no delay follows the final
/// attempt. The last error is returned once attempts are exhausted.
/// Cancellation is returned immediately and does not consume an attempt.
pub async fn retry<T, F, Fut>(mut operation: F, max_attempts: u32, base_delay: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                log::warn!("Retry {}/{} failed: {}", attempt, max_attempts, e);
                async_delay(base_delay * attempt).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_uses_linear_delays() {
        let calls: Mutex<Vec<Instant>> = Mutex::new(Vec::new());

        let result: Result<()> = retry(
            || {
                calls.lock().unwrap().push(Instant::now());
                async { Err(TileError::Storage("boom".to_string())) }
            },
            3,
            Duration::from_millis(500),
        )
        .await;

        assert!(matches!(result, Err(TileError::Storage(ref m)) if m == "boom"));
        let calls = calls.into_inner().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(500));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TileError::Http {
                            status: 503,
                            url: "http://test".to_string(),
                        })
                    } else {
                        Ok(n)
                    }
                }
            },
            3,
            Duration::from_millis(500),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<()> = retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(TileError::Cancelled) }
            },
            3,
            Duration::from_millis(500),
        )
        .await;

        assert!(matches!(result, Err(TileError::Cancelled)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(Instant::now(), started);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let attempts = AtomicU32::new(0);
        let _ = retry(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TileError>(()) }
            },
            0,
            Duration::ZERO,
        )
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
