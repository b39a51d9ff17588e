//! Generic retry with exponential backoff.
//!
//! Used for git pushes and any other call whose failure mode is plausibly
//! transient (network, remote lock). The final error is returned unmodified
//! so the caller can classify it.

use std::future::Future;
use std::time::Duration;

/// Invoke `op`; on failure sleep `base_delay * 2^attempt` and retry, up to
/// `max_retries` additional attempts. `op` is a factory so each attempt gets
/// a fresh future.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut op: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(_) if attempt < max_retries => {
                let delay = base_delay * 2u32.saturating_pow(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result: Result<u32, &str> = retry_with_backoff(
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result: Result<&str, &str> = retry_with_backoff(
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err("transient") } else { Ok("done") }
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;
        // Exactly three calls: two failures plus the success
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error_unmodified() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result: Result<(), String> = retry_with_backoff(
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(format!("attempt {}", n))
                }
            },
            2,
            Duration::from_millis(1),
        )
        .await;
        // max_retries=2 means 1 initial + 2 retries = 3 calls; last error wins
        assert_eq!(result.unwrap_err(), "attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_single_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let result: Result<(), &str> = retry_with_backoff(
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("nope")
                }
            },
            0,
            Duration::from_millis(1),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
