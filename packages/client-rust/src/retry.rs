//! Retry-with-backoff for single asynchronous operations.
//!
//! Each call keeps its own attempt counter, so concurrent callers never
//! share state. Cancellation is whatever the wrapped future does when
//! dropped.

use std::fmt::Display;
use std::future::Future;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;

/// Runs `operation` until it succeeds, `retry_on` rejects its error, or
/// `config.max_retry_count` retries are spent.
///
/// The wait before retry `n` (zero-based) is
/// `min(2^n * base_delay + jitter, max_backoff)` with jitter drawn uniformly
/// from `[0, max_jitter)`. The last error is returned unchanged.
///
/// # Errors
///
/// The operation's own error, either the first one `retry_on` declines or the
/// one from the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut retry_on: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if attempt >= config.max_retry_count || !retry_on(&error) {
            return Err(error);
        }

        let jitter = if config.max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..config.max_jitter_ms)
        };
        let wait = config.backoff(attempt, jitter);

        #[allow(clippy::cast_possible_truncation)]
        let wait_ms = wait.as_millis() as u64;
        warn!(
            attempt = attempt + 1,
            max_retries = config.max_retry_count,
            wait_ms,
            error = %error,
            "operation failed, retrying"
        );

        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
