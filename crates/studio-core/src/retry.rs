//! Bounded retry with constant or server-specified backoff.
//!
//! Every remote call that can be rate limited goes through
//! [`RetryPolicy::run`]. The policy never adds jitter or grows the delay: it
//! waits either the delay carried by the failure or its default.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Failure classification consumed by [`RetryPolicy`].
pub trait Retryable {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool;

    /// Delay requested by the failure itself (e.g. a rate-limit hint).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Which failures trigger another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Only failures reporting `is_retryable()`.
    Transient,
    /// Any failure.
    Any,
}

/// Retry policy: bounded attempts, constant delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of invocations (0 is treated as 1).
    pub max_attempts: u32,

    /// Delay used when the failure does not carry one.
    #[serde(with = "duration_ms")]
    pub default_delay: Duration,

    /// Failure filter.
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::rate_limited()
    }
}

impl RetryPolicy {
    /// Policy for rate-limited generation endpoints: 6 attempts, 10s default.
    pub fn rate_limited() -> Self {
        Self {
            max_attempts: 6,
            default_delay: Duration::from_secs(10),
            retry_on: RetryOn::Transient,
        }
    }

    /// Retry any failure a fixed number of times with a fixed delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            default_delay: delay,
            retry_on: RetryOn::Any,
        }
    }

    /// Restrict retries to failures reporting `is_retryable()`.
    pub fn transient_only(mut self) -> Self {
        self.retry_on = RetryOn::Transient;
        self
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            default_delay: Duration::ZERO,
            retry_on: RetryOn::Transient,
        }
    }

    /// Run `op` until it succeeds, the failure is not retryable, or attempts
    /// run out. The last failure is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let eligible = match self.retry_on {
                        RetryOn::Any => true,
                        RetryOn::Transient => err.is_retryable(),
                    };

                    if attempt >= max_attempts || !eligible {
                        return Err(err);
                    }

                    let delay = err.retry_after().unwrap_or(self.default_delay);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed: {}; retrying",
                        label,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StudioError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn rate_limited(secs: Option<u64>) -> StudioError {
        StudioError::RateLimited {
            provider: "replicate".to_string(),
            retry_after: secs.map(Duration::from_secs),
            message: "throttled".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::rate_limited();

        let c = calls.clone();
        let result: Result<u32, StudioError> = policy
            .run("op", || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) + 1) }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_attempts() {
        for max_attempts in 1..=5u32 {
            let calls = Arc::new(AtomicU32::new(0));
            let policy = RetryPolicy {
                max_attempts,
                default_delay: Duration::from_millis(5),
                retry_on: RetryOn::Transient,
            };

            let c = calls.clone();
            let result: Result<(), StudioError> = policy
                .run("op", || {
                    let c = c.clone();
                    async move {
                        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                        Err(StudioError::transport("openai", format!("attempt {}", n)))
                    }
                })
                .await;

            assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            // The last failure comes back unchanged
            let err = result.unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("openai request failed: attempt {}", max_attempts)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 0,
            default_delay: Duration::from_secs(1),
            retry_on: RetryOn::Any,
        };

        let c = calls.clone();
        let result: Result<(), StudioError> = policy
            .run("op", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(StudioError::internal("boom"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::rate_limited();

        let c = calls.clone();
        let result: Result<(), StudioError> = policy
            .run("op", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(StudioError::invalid_argument("prompt is required"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_policy_retries_everything() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));

        let c = calls.clone();
        let result: Result<(), StudioError> = policy
            .run("op", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(StudioError::invalid_argument("always"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_transient_only_skips_client_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2)).transient_only();
        let start = Instant::now();

        let c = calls.clone();
        let result: Result<(), StudioError> = policy
            .run("upsert", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(StudioError::Upstream {
                        provider: "pinecone".to_string(),
                        status: Some(400),
                        message: "dimension mismatch".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), StudioError> = policy
            .run("upsert", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(StudioError::transport("pinecone", "connection reset"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uses_server_delay_then_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 5,
            default_delay: Duration::from_secs(10),
            retry_on: RetryOn::Transient,
        };
        let start = Instant::now();

        let c = calls.clone();
        let result: Result<&str, StudioError> = policy
            .run("generate image", || {
                let c = c.clone();
                async move {
                    match c.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(rate_limited(Some(3))),
                        1 => Err(rate_limited(None)),
                        _ => Ok("image"),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "image");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 3s from the hint, then the 10s default
        assert_eq!(start.elapsed(), Duration::from_secs(13));
    }

    #[test]
    fn test_policy_serde() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(2000));
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"default_delay\":2000"));
        let back: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_attempts, 3);
        assert_eq!(back.retry_on, RetryOn::Any);
    }
}
