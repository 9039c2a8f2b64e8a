//! Opt-in resilience helpers: bounded retry, deadlines and a submit gate.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// Sleeps `base_delay * 2^i` between attempts and returns the last failure.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_if(policy, |_: &E| true, op).await
}

/// Like [`retry_with_backoff`], but a failure for which `should_retry`
/// returns false is handed back immediately.
pub async fn retry_with_backoff_if<T, E, P, F, Fut>(
    policy: RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    P: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < max_attempts && should_retry(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError<E> {
    #[error("Request timed out after {0:?}")]
    Elapsed(Duration),

    #[error(transparent)]
    Failed(E),
}

/// Race `fut` against a deadline.
///
/// On expiry the future is dropped; any work it already handed off keeps
/// running and its result is discarded.
pub async fn with_timeout<T, E, Fut>(deadline: Duration, fut: Fut) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(TimeoutError::Failed),
        Err(_) => {
            tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Request deadline elapsed");
            Err(TimeoutError::Elapsed(deadline))
        }
    }
}

/// Disable-while-pending guard against double submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitGate {
    pending: Arc<AtomicBool>,
}

impl SubmitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit for a new submission, or `None` while one is in flight.
    pub fn try_begin(&self) -> Option<SubmitPermit> {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitPermit {
                pending: Arc::clone(&self.pending),
            })
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Re-opens its gate on drop.
#[derive(Debug)]
pub struct SubmitPermit {
    pending: Arc<AtomicBool>,
}

impl Drop for SubmitPermit {
    fn drop(&mut self) {
        self.pending.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<u32, String> =
            retry_with_backoff(RetryPolicy::new(3, Duration::from_secs(1)), move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_last_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = tokio::time::Instant::now();
        let result: Result<(), String> =
            retry_with_backoff(RetryPolicy::new(3, Duration::from_millis(100)), move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            })
            .await;
        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_permanent_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = tokio::time::Instant::now();
        let result: Result<(), String> = retry_with_backoff_if(
            RetryPolicy::new(3, Duration::from_secs(1)),
            |e: &String| e.starts_with("transient"),
            move || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err("transient glitch".to_string()),
                    _ => Err("rejected".to_string()),
                }
            },
        )
        .await;
        assert_eq!(result, Err("rejected".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_failure() {
        let elapsed: Result<(), TimeoutError<String>> = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(elapsed, Err(TimeoutError::Elapsed(Duration::from_secs(1))));

        let failed: Result<(), TimeoutError<String>> =
            with_timeout(Duration::from_secs(1), async { Err("boom".to_string()) }).await;
        assert_eq!(failed, Err(TimeoutError::Failed("boom".to_string())));

        let ok: Result<u8, TimeoutError<String>> =
            with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
    }

    #[test]
    fn test_submit_gate_blocks_second_submission() {
        let gate = SubmitGate::new();
        let permit = gate.try_begin().unwrap();
        assert!(gate.is_pending());
        assert!(gate.try_begin().is_none());
        drop(permit);
        assert!(!gate.is_pending());
        assert!(gate.try_begin().is_some());
    }
}
