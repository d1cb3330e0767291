//! Bounded exponential backoff for remote calls.
//!
//! Only errors that report themselves retryable are retried; everything else
//! returns immediately. Exhausting the budget returns the last error - the
//! caller decides what "give up" means (for check-run pushes: log, stay
//! dirty, wait for the next event).

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// An error that knows whether repeating the operation could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Configuration for exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
}

impl RetryConfig {
    /// Default for check-run pushes: three attempts in total, 1s then 2s
    /// between them.
    pub const DEFAULT: Self = Self {
        max_retries: 2,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(4),
        multiplier: 2.0,
    };

    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// Delay before retry `attempt` (0-indexed):
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// All retry delays in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs `operation`, retrying retryable errors with backoff.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `config.max_retries` retries are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt >= config.max_retries {
                    return Err(e);
                }
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
