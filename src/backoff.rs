//! Reconnect delays: exponential growth with random jitter.
//!
//! ```ignore
//! let mut backoff = Backoff::new(
//!     Duration::from_millis(500),
//!     Duration::from_secs(30),
//!     2.0,
//!     0.0,
//! );
//! assert_eq!(backoff.next_delay(), Duration::from_millis(500));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! backoff.reset();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

use crate::config::Settings;

// ============================================================================
// Constants
// ============================================================================

/// Growth factor between consecutive reconnect attempts.
pub const DEFAULT_FACTOR: f64 = 2.0;

/// Relative jitter applied as `±jitter`.
pub const DEFAULT_JITTER: f64 = 0.1;

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff with jitter.
///
/// The delay for attempt `n` is `min(base * factor^n, max)` scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff with explicit parameters.
    ///
    /// `jitter` is clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn new(base: Duration, max: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            base,
            max,
            factor,
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
        }
    }

    /// Creates the reconnect backoff described by `settings`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.reconnect_delay(),
            settings.reconnect_max_delay(),
            DEFAULT_FACTOR,
            DEFAULT_JITTER,
        )
    }

    /// Returns the next delay and advances the attempt counter.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let exponent = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let multiplier = self.factor.powi(exponent);
        let delay = if multiplier.is_finite() {
            self.base.mul_f64(multiplier.min(u32::MAX as f64)).min(self.max)
        } else {
            self.max
        };
        self.attempt = self.attempt.saturating_add(1);

        if self.jitter == 0.0 {
            return delay;
        }
        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        delay.mul_f64(1.0 + spread)
    }

    /// Resets the attempt counter after a successful connection.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(base_ms: u64, max_ms: u64) -> Backoff {
        Backoff::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            2.0,
            0.0,
        )
    }

    #[test]
    fn test_delays_double() {
        let mut backoff = exact(100, 60_000);
        let delays: Vec<_> = (0..4).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn test_delay_is_capped() {
        let mut backoff = exact(100, 500);
        for _ in 0..3 {
            let _ = backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        for _ in 0..100 {
            let _ = backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_reset() {
        let mut backoff = exact(100, 60_000);
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_window() {
        let mut backoff = Backoff::new(
            Duration::from_millis(1000),
            Duration::from_secs(30),
            2.0,
            0.2,
        );
        for _ in 0..50 {
            backoff.reset();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(800), "{delay:?}");
            assert!(delay <= Duration::from_millis(1200), "{delay:?}");
        }
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::default()
            .with_reconnect_delay(Duration::from_millis(250), Duration::from_secs(5));
        let backoff = Backoff::from_settings(&settings);
        assert_eq!(backoff.base, Duration::from_millis(250));
        assert_eq!(backoff.max, Duration::from_secs(5));
    }
}
