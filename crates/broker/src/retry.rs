//! Startup retry with a fixed delay
//!
//! A service must not run without broker connectivity. Connecting is retried a
//! bounded number of times with a fixed pause in between; once the attempts
//! are used up the caller gets a fatal error and is expected to exit.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::{BrokerError, Result};

/// Configuration for fixed-delay retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Pause between two attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Retry a fallible async operation with a fixed delay between attempts
///
/// Returns the first success, or the last error once `max_attempts` is reached.
pub async fn retry_fixed<F, Fut, T, E>(
    mut operation: F,
    policy: &RetryPolicy,
    context: &str,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                error!(context, attempts = attempt, error = %e, "Operation failed after max retries");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    context,
                    attempt,
                    max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                metrics::counter!("broker_connect_retries_total", "target" => context.to_string())
                    .increment(1);
                sleep(policy.delay).await;
            }
        }
    }
}

/// Establish a broker connection, retrying per `policy`
///
/// Exhausting the attempts yields [`BrokerError::ConnectionExhausted`], which
/// callers treat as fatal.
pub async fn connect_with_retry<F, Fut, T>(connect: F, policy: &RetryPolicy, target: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_fixed(connect, policy, target)
        .await
        .map_err(|e| BrokerError::ConnectionExhausted {
            target: target.to_string(),
            attempts: policy.max_attempts.max(1),
            last_error: e.to_string(),
        })
}
