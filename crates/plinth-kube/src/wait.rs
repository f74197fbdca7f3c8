//! Polling and retry primitives
//!
//! All waits in the engine are built from two loops: [`poll_until`] for
//! "wait until the cluster says yes" and [`retry_if`] for "try again while
//! the failure looks transient".

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::warn;

use plinth_core::Timeouts;

use crate::error::{DeployError, Result};

/// Interval between readiness checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Evaluate `condition` until it yields `true`
///
/// The condition runs immediately, then once per `interval`. An `Err` aborts
/// the wait. When `timeout` elapses first the result is
/// [`DeployError::Timeout`]; the final sleep never overshoots the deadline.
pub async fn poll_until<F, Fut>(interval: Duration, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    // Budgets too large to represent never expire
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if condition().await? {
            return Ok(());
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(DeployError::Timeout { after: timeout });
                }
                interval.min(deadline - now)
            }
            None => interval,
        };
        sleep(pause).await;
    }
}

/// How often and how fast to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Total invocations, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

impl From<&Timeouts> for RetryPolicy {
    fn from(t: &Timeouts) -> Self {
        Self {
            delay: t.retry_delay,
            max_attempts: t.retry_attempts,
        }
    }
}

/// Run `op`, retrying while its error message satisfies `is_retryable`
///
/// `op` runs at most `max_attempts` times (at least once) with a fixed delay
/// in between. The last error is returned unchanged.
pub async fn retry_if<T, F, Fut, P>(policy: RetryPolicy, is_retryable: P, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&str) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let message = e.to_string();
                if attempt >= attempts || !is_retryable(&message) {
                    return Err(e);
                }
                warn!(attempt, max_attempts = attempts, error = %message, "transient failure, retrying");
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

const TRANSIENT: &[&str] = &[
    "x509",
    "tls: ",
    "failed calling webhook",
    "EOF",
    "connection refused",
    "connection reset by peer",
];

/// Failures typical of a webhook or API server that is still starting
pub fn is_transient(message: &str) -> bool {
    TRANSIENT.iter().any(|t| message.contains(t))
}
