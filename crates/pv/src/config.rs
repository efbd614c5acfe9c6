//! Configuration types for PV access.

use std::time::Duration;

/// Complete PV access configuration: timeout + retry settings.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct PvConfig {
    /// Maximum time to wait for a channel to connect and return a value.
    ///
    /// Instruments may legitimately be switched off, so this is kept short.
    pub timeout: Duration,
    /// `EPICS_CA_MAX_ARRAY_BYTES` for each read. Compressed block server
    /// payloads are larger than the Channel Access default.
    pub max_array_bytes: u64,
    /// Retry settings for transient failures.
    pub retry: RetryConfig,
}

/// Array size limit large enough for every block server payload.
pub const DEFAULT_MAX_ARRAY_BYTES: u64 = 1_000_000;

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
            retry: RetryConfig::default(),
        }
    }
}

impl PvConfig {
    /// Configuration with the given timeout and attempt count.
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
            retry: RetryConfig {
                max_attempts,
                ..RetryConfig::default()
            },
        }
    }

    /// Override the Channel Access array size limit.
    pub fn with_max_array_bytes(mut self, bytes: u64) -> Self {
        self.max_array_bytes = bytes;
        self
    }
}

/// Retry settings for transient failures.
///
/// Uses exponential backoff with optional jitter. Only errors where
/// `PvError::is_retryable()` returns `true` are retried.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Whether to add random jitter to retry delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            jitter: true,
        }
    }
}
