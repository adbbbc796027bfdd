//! Retry with exponential backoff and jitter
//!
//! Used for startup calls (CRD installation) that race the API server coming
//! up. Per-object failures inside reconcile are not retried here; the
//! controller's requeue covers those.
//!
//! ```ignore
//! use component_operator::retry::{retry_with_backoff, RetryConfig};
//!
//! retry_with_backoff(&RetryConfig::startup(), "install CRDs", || install(&client)).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff settings
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts; 0 retries forever
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Factor applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Settings for startup calls: a bounded number of attempts starting at 500ms
    pub fn startup() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// Nominal delay after the `failures`-th failure, capped at `max_delay`
    pub fn delay_after(&self, failures: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(failures.saturating_sub(1) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is exhausted.
///
/// Each delay is jittered between 0.5x and 1.5x of the nominal backoff. The
/// last error is returned when attempts run out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;
    loop {
        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        attempts += 1;

        if config.exhausted(attempts) {
            error!(
                operation = %operation_name,
                attempts,
                error = %e,
                "giving up"
            );
            return Err(e);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = config.delay_after(attempts).mul_f64(jitter);
        warn!(
            operation = %operation_name,
            attempts,
            error = %e,
            delay_ms = delay.as_millis(),
            "retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
