//! Reconnection Policy
//!
//! Decides how long to wait between failed dial attempts after a connection
//! drops. The default retries every 5 seconds forever. Capped exponential
//! growth, jitter and an attempt limit can be switched on through
//! [`ReconnectConfig`].

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any wait.
    pub max_delay: Duration,
    /// Growth factor per failed attempt (1.0 keeps the interval fixed).
    pub multiplier: f64,
    /// Jitter as a fraction of the wait (0.1 = ±10%, capped at 1.0).
    pub jitter_factor: f64,
    /// Maximum number of failed dials before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl ReconnectConfig {
    /// Retry forever at a fixed interval.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Retry forever with capped exponential backoff.
    #[must_use]
    pub const fn exponential(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Set the jitter fraction.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Limit the number of failed dials (0 = unlimited).
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Tracks failed attempts and produces the next wait.
///
/// # Example
///
/// ```rust
/// use ndex_stream::infrastructure::ndex::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
/// assert_eq!(policy.attempt_count(), 2);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Record a failed dial and return the wait before the next one.
    ///
    /// Returns `None` once `max_attempts` dials have failed.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        let exponent = i32::try_from(self.attempt_count).unwrap_or(i32::MAX);
        self.attempt_count = self.attempt_count.saturating_add(1);
        if !self.should_retry() {
            return None;
        }

        let factor = self.config.multiplier.powi(exponent);
        let scaled = Duration::try_from_secs_f64(self.config.initial_delay.as_secs_f64() * factor)
            .unwrap_or(self.config.max_delay);

        Some(self.apply_jitter(scaled.min(self.config.max_delay)))
    }

    /// Failed dials recorded so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another dial is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.config.jitter_factor.is_finite() || self.config.jitter_factor <= 0.0 {
            return delay;
        }

        let base = delay.as_secs_f64();
        let spread = base * self.config.jitter_factor.min(1.0);
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::try_from_secs_f64((base + offset).max(0.001)).unwrap_or(delay)
    }
}

/// Error type for reconnection failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}
