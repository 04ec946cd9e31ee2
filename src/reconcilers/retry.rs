// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for platform calls.
//!
//! Transient failures ([`ControllerError::is_retryable`]) are retried with
//! exponential backoff and jitter; every other error fails fast.

use crate::errors::{ControllerError, Result};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Maximum total time to spend retrying (5 minutes)
const MAX_ELAPSED_TIME_SECS: u64 = 300;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (30 seconds)
const MAX_INTERVAL_SECS: u64 = 30;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Watch re-subscription initial interval (500ms)
const WATCH_INITIAL_INTERVAL_MILLIS: u64 = 500;

/// Watch re-subscription maximum interval (1 minute)
const WATCH_MAX_INTERVAL_SECS: u64 = 60;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration, restored by [`ExponentialBackoff::reset`]
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time; `None` retries forever
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Start over from the initial interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = rand::rng().random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create default exponential backoff configuration for platform retries.
///
/// # Configuration
///
/// - **Initial interval**: 100ms
/// - **Max interval**: 30 seconds
/// - **Max elapsed time**: 5 minutes total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Create backoff configuration for re-establishing watch subscriptions.
///
/// A watch loop never gives up, so there is no maximum elapsed time.
///
/// # Configuration
///
/// - **Initial interval**: 500ms
/// - **Max interval**: 1 minute
/// - **Max elapsed time**: none
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn watch_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(WATCH_INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(WATCH_MAX_INTERVAL_SECS),
        None,
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a platform operation with exponential backoff.
///
/// Retries while the operation fails with a retryable error and fails
/// immediately on any other error.
///
/// # Errors
///
/// Returns the last error if it is not retryable or the backoff is exhausted.
///
/// # Example
///
/// ```no_run
/// use address_controller::platform::{memory::InMemoryPlatform, Platform};
/// use address_controller::reconcilers::retry::retry_with_backoff;
///
/// # async fn example() -> address_controller::errors::Result<()> {
/// let platform = InMemoryPlatform::new();
/// let record = retry_with_backoff(
///     || platform.get_config("acme", "instance-acme"),
///     "get instance record",
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<T, F, Fut>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_with(default_backoff(), operation, operation_name).await
}

/// Retry a platform operation with a caller-supplied backoff.
///
/// # Errors
///
/// Returns the last error if it is not retryable or the backoff is exhausted.
pub async fn retry_with<T, F, Fut>(
    mut backoff: ExponentialBackoff,
    mut operation: F,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error: ControllerError = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Platform call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            debug!(
                operation = operation_name,
                error = %error,
                "Non-retryable error, failing immediately"
            );
            return Err(error);
        }

        if let Some(duration) = backoff.next_backoff() {
            warn!(
                operation = operation_name,
                attempt = attempt,
                retry_after = ?duration,
                error = %error,
                "Retryable platform error, will retry"
            );
            tokio::time::sleep(duration).await;
        } else {
            error!(
                operation = operation_name,
                attempt = attempt,
                elapsed = ?start_time.elapsed(),
                error = %error,
                "Backoff exhausted, giving up"
            );
            return Err(error);
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
