use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::warn;

/// Shared retry policy for provider calls. One policy, parameterized per
/// call site, instead of ad hoc loops at each seam.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delays, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt,
    /// capped, plus 0-500ms jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if backoff.is_zero() {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..500))
    }

    /// Run `op` until it succeeds or attempts are exhausted. The closure
    /// receives the 0-based attempt number. Returns the value and the
    /// number of attempts consumed.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<(T, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt + 1)),
                Err(e) if attempt + 1 < self.max_attempts => {
                    let backoff = self.delay(attempt);
                    warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try_uses_one_attempt() {
        let policy = RetryPolicy::immediate(3);
        let (value, attempts) = policy
            .run("op", |_| async { Ok::<_, anyhow::Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);
        let (_, attempts) = policy
            .run("op", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("transient");
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);
        let result: Result<((), u32)> = policy
            .run("op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("permanent") }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        };
        // 2 * 2^8 = 512s uncapped; cap plus jitter stays under 31s
        assert!(policy.delay(8) <= Duration::from_millis(30_500));
    }
}
