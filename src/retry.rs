//! Retry utilities with exponential backoff and jitter.
//!
//! Two flavours live here:
//!
//! - [`retry_with_backoff`] retries any async operation that may fail
//!   transiently, using exponential backoff with jitter. The dispatcher uses
//!   it to re-run failed reconcile passes.
//! - [`create_until_visible`] creates a record and waits until the store
//!   reports it, absorbing "already exists" races and read-after-write lag.
//!
//! # Example
//!
//! ```ignore
//! use bucket_provisioner::retry::{retry_with_backoff, RetryConfig};
//!
//! let result = retry_with_backoff(
//!     &RetryConfig::default(),
//!     "reconcile team-a/photos",
//!     || async { reconciler.reconcile(&key).await },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::Result;

/// Smallest interval between visibility polls
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Smallest total time spent waiting for a record to become visible
pub const MIN_RETRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for operations that may fail transiently.
///
/// Used for whole reconcile passes to handle transient failures
/// with exponential backoff and jitter.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Create a config that retries forever (infinite attempts)
    pub fn infinite() -> Self {
        Self::default()
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Retries indefinitely (or up to max_attempts if set) until success.
///
/// # Returns
/// The result of the operation, or the last error if max_attempts is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_if(config, operation_name, |_| true, operation).await
}

/// Like [`retry_with_backoff`], but stops at the first error `retryable`
/// rejects and returns it.
pub async fn retry_with_backoff_if<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    retryable: R,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !retryable(&e) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed with a non-retryable error"
                    );
                    return Err(e);
                }
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                // Exponential backoff, capped at max_delay
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Create a record and wait until the store reports it.
///
/// - `create` succeeds: its result is returned.
/// - `create` reports "already exists": the existing record is fetched and
///   returned, so a repeated pass adopts what an earlier pass persisted.
/// - any other `create` error: `fetch` is polled every `interval` until the
///   record is visible.
///
/// An "already exists" record that cannot be read yet is polled the same
/// way. If `timeout` elapses first, the original create error is returned,
/// so callers still see "already exists" for a record that lags.
pub async fn create_until_visible<T, C, CFut, F, FFut>(
    interval: Duration,
    timeout: Duration,
    what: &str,
    create: C,
    mut fetch: F,
) -> Result<T>
where
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<T>>,
    F: FnMut() -> FFut,
    FFut: Future<Output = Result<T>>,
{
    let start = Instant::now();

    let create_err = match create().await {
        Ok(created) => return Ok(created),
        Err(e) if e.is_already_exists() => {
            debug!(record = %what, "already exists, adopting");
            match fetch().await {
                Ok(existing) => return Ok(existing),
                Err(fetch_err) => {
                    debug!(record = %what, error = %fetch_err, "existing record not visible yet");
                    e
                }
            }
        }
        Err(e) => {
            warn!(
                record = %what,
                error = %e,
                "create failed, waiting for record to become visible"
            );
            e
        }
    };

    loop {
        tokio::time::sleep(interval).await;

        match fetch().await {
            Ok(found) => {
                debug!(record = %what, "record became visible");
                return Ok(found);
            }
            Err(e) => {
                if start.elapsed() > timeout {
                    error!(
                        record = %what,
                        timeout_secs = timeout.as_secs(),
                        "record never became visible"
                    );
                    return Err(create_err);
                }
                debug!(record = %what, error = %e, "record not visible yet");
            }
        }
    }
}
