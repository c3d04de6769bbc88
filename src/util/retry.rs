//! Bounded retry with a fixed delay between attempts.
//!
//! Every error is treated as retryable: there is no classification, no backoff
//! growth and no jitter. Callers that need exponential backoff (the geocoder)
//! implement it locally.
use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::util::env::env_parse;

/// Attempts and delay applied around a fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Policy used by tests and by callers that must fail fast.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Default policy with `RETRY_MAX_ATTEMPTS` / `RETRY_DELAY_SECS` overrides.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            max_attempts: env_parse("RETRY_MAX_ATTEMPTS", base.max_attempts),
            delay: Duration::from_secs(env_parse("RETRY_DELAY_SECS", base.delay.as_secs())),
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` invocations have failed.
///
/// The last error is returned unchanged so callers can still downcast it.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    error!(op = op_name, attempts, error = %err, "max retry attempts reached");
                    return Err(err);
                }
                warn!(op = op_name, attempt, attempts, error = %err, "operation failed");
                info!(
                    op = op_name,
                    delay_secs = policy.delay.as_secs_f64(),
                    "retrying after delay"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
        }
    }
}
