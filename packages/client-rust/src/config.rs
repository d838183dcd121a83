use std::time::Duration;

use serde::{Deserialize, Serialize};
use termvault_core::DEFAULT_QUERY_LIMIT;

/// Backoff policy for calls to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Retries after the first attempt. The operation runs at most
    /// `max_retry_count + 1` times.
    pub max_retry_count: u32,
    /// Base delay, doubled on every retry.
    pub base_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each wait.
    pub max_jitter_ms: u64,
    /// Cap on any single wait.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 5,
            base_delay_ms: 100,
            max_jitter_ms: 500,
            max_backoff_ms: 32_000,
        }
    }
}

impl RetryConfig {
    /// Wait before retry number `attempt` (zero-based), given a jitter draw.
    #[must_use]
    pub fn backoff(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponential = 2u64
            .checked_pow(attempt)
            .and_then(|factor| factor.checked_mul(self.base_delay_ms))
            .unwrap_or(u64::MAX);
        let wait = exponential
            .saturating_add(jitter_ms)
            .min(self.max_backoff_ms);
        Duration::from_millis(wait)
    }
}

/// Client-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub retry: RetryConfig,
    /// Records per batch when streaming puts.
    pub stream_batch_size: usize,
    /// Limit applied to queries that do not set one.
    pub default_query_limit: u32,
    /// Address of the remote service. Recorded in schema exports.
    pub service: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            stream_batch_size: 50,
            default_query_limit: DEFAULT_QUERY_LIMIT,
            service: String::new(),
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by any `TERMVAULT_*` environment variables that
    /// parse. Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TERMVAULT_SERVICE") {
            config.service = val;
        }
        if let Some(v) = env_parse("TERMVAULT_MAX_RETRY_COUNT") {
            config.retry.max_retry_count = v;
        }
        if let Some(v) = env_parse("TERMVAULT_MAX_BACKOFF_MS") {
            config.retry.max_backoff_ms = v;
        }
        if let Some(v) = env_parse("TERMVAULT_STREAM_BATCH_SIZE") {
            config.stream_batch_size = v;
        }
        if let Some(v) = env_parse("TERMVAULT_DEFAULT_QUERY_LIMIT") {
            config.default_query_limit = v;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
