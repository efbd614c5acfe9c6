//! Retry wrapper that adds exponential-backoff retry logic to any `ValueSource`.

use std::time::{Duration, SystemTime};

use crate::config::RetryConfig;
use crate::{PvError, ValueSource};

/// A wrapper that adds retry-with-backoff to any [`ValueSource`].
///
/// Only transient failures (connect timeouts, failed reads) are retried. A PV
/// that does not exist fails immediately.
pub struct RetrySource<S> {
    inner: S,
    retry_config: RetryConfig,
}

impl<S> RetrySource<S> {
    /// Create a new `RetrySource` wrapping `inner` with the given retry configuration.
    pub fn new(inner: S, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }

    /// Get a shared reference to the inner source.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ValueSource> ValueSource for RetrySource<S> {
    fn read(&self, pv: &str) -> Result<String, PvError> {
        retry_op(&self.retry_config, || self.inner.read(pv))
    }
}

// ── Retry helper ───────────────────────────────────────────────────────

/// Execute `op`, retrying on retryable errors with exponential backoff.
///
/// Non-retryable errors are returned immediately. On exhausting all attempts
/// the last retryable error is wrapped in [`PvError::RetriesExhausted`].
fn retry_op<T, F>(config: &RetryConfig, mut op: F) -> Result<T, PvError>
where
    F: FnMut() -> Result<T, PvError>,
{
    if config.max_attempts == 0 {
        return Err(PvError::InvalidConfig("max_attempts must be >= 1".into()));
    }

    let mut last_error: Option<PvError> = None;

    for attempt in 0..config.max_attempts {
        match op() {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                tracing::debug!(attempt, error = %e, "transient PV read failure");
                last_error = Some(e);

                if attempt + 1 < config.max_attempts {
                    std::thread::sleep(compute_delay(config, attempt));
                }
            }
        }
    }

    match last_error {
        Some(last) => Err(PvError::RetriesExhausted {
            attempts: config.max_attempts,
            last_error: Box::new(last),
        }),
        None => Err(PvError::InvalidConfig("no attempt was made".into())),
    }
}

/// Compute the backoff delay for the given `attempt` (0-indexed).
///
/// delay = min(initial_delay * 2^attempt, max_delay), optionally with jitter.
fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config
        .initial_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let capped = base.min(config.max_delay);

    if !config.jitter {
        return capped;
    }

    // Pick a duration in [capped/2, capped] using the clock as entropy.
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let half = capped / 2;
    let jitter_range_nanos = capped.as_nanos().saturating_sub(half.as_nanos());
    if jitter_range_nanos == 0 {
        return capped;
    }
    let offset_nanos = u128::from(nanos) % jitter_range_nanos;
    half + Duration::from_nanos(u64::try_from(offset_nanos).unwrap_or(u64::MAX))
}
