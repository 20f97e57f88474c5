//! Backoff policy types and configuration.

use std::time::Duration;

use super::error::ConfigError;

/// Delay before the second attempt of every fresh session.
pub const INITIAL_DELAY: Duration = Duration::from_millis(200);

/// Multiplier applied to the session delay after every failed attempt.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Compute the delay that follows `current` for a geometric schedule.
///
/// This is the whole backoff policy: `current * factor`. There is no upper
/// bound; the result saturates at [`Duration::MAX`] rather than overflowing.
/// For `factor > 1.0` the result is always at least one nanosecond longer
/// than `current` (below the saturation point), even when rounding to whole
/// nanoseconds would otherwise stall the schedule.
///
/// # Examples
///
/// ```rust
/// use relentless::retry::next_delay;
/// use std::time::Duration;
///
/// let d = next_delay(Duration::from_millis(200), 1.5);
/// assert_eq!(d, Duration::from_millis(300));
/// assert_eq!(next_delay(d, 1.5), Duration::from_millis(450));
/// ```
pub fn next_delay(current: Duration, factor: f64) -> Duration {
    // Scale whole nanoseconds so 200ms * 1.5^n stays exact.
    let nanos = (current.as_nanos() as f64 * factor).round();
    let secs = (nanos / NANOS_PER_SEC).floor();
    if secs >= u64::MAX as f64 {
        return Duration::MAX;
    }
    let subsec = nanos - secs * NANOS_PER_SEC;
    let next = Duration::new(secs as u64, subsec as u32);
    if factor > 1.0 && next <= current {
        return current.saturating_add(Duration::from_nanos(1));
    }
    next
}

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Configuration for the backoff schedule shared by every session of a factory.
///
/// Configs are pure data: they describe the schedule but never sleep. The
/// defaults reproduce the classic schedule of 200ms, 300ms, 450ms, 675ms, ...
///
/// # Examples
///
/// ```rust
/// use relentless::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.initial_delay(), Duration::from_millis(200));
/// assert_eq!(config.factor(), 1.5);
///
/// let fast = RetryConfig::default()
///     .with_initial_delay(Duration::from_millis(10))
///     .with_factor(2.0);
/// assert!(fast.validate().is_ok());
/// assert_eq!(fast.delay_for_attempt(2), Duration::from_millis(40));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryConfig {
    initial_delay: Duration,
    factor: f64,
    jitter: JitterStrategy,
}

/// Strategy for adding randomness to the wait before a retry.
///
/// Jitter only changes how long the loop sleeps. The session delay itself
/// stays on the geometric schedule.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to delay.
    Proportional(f64),
    /// Random delay between 0 and the scheduled delay.
    Full,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            factor: BACKOFF_FACTOR,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Set the delay that precedes the second attempt.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the multiplier applied after each failure.
    ///
    /// Must be finite and greater than `1.0`; see [`RetryConfig::validate`].
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Add proportional jitter to waits.
    ///
    /// `0.25` means the actual wait is within ±25% of the scheduled delay.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, waits are exact.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Use full jitter: each wait is random between zero and the scheduled delay.
    ///
    /// **Note**: Requires the `jitter` feature. Without it, waits are exact.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// Get the delay that precedes the second attempt.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Get the growth factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// Scheduled delay after the failure of attempt N (0-indexed), before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        (0..attempt).fold(self.initial_delay, |d, _| next_delay(d, self.factor))
    }

    /// Check that the schedule strictly grows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::ZeroInitialDelay);
        }
        if !self.factor.is_finite() || self.factor <= 1.0 {
            return Err(ConfigError::NonGrowingFactor(self.factor));
        }
        if let JitterStrategy::Proportional(j) = self.jitter {
            if !(0.0..=1.0).contains(&j) {
                return Err(ConfigError::InvalidJitter(j));
            }
        }
        Ok(())
    }
}

impl JitterStrategy {
    /// Apply jitter to a scheduled delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterStrategy::None => delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let millis = delay.as_millis() as f64;
                let range = millis * factor;
                let min = (millis - range).max(0.0);
                let max = millis + range;
                if max <= min {
                    delay
                } else {
                    Duration::from_millis(rand::rng().random_range(min..=max) as u64)
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) => delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max_millis = delay.as_millis() as u64;
                if max_millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Full => delay,
        }
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn test_next_delay_grows_by_half() {
        let mut d = INITIAL_DELAY;
        let mut seen = vec![];
        for _ in 0..5 {
            seen.push(d);
            d = next_delay(d, BACKOFF_FACTOR);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(450),
                Duration::from_millis(675),
                Duration::from_micros(1_012_500),
            ]
        );
    }

    #[test]
    fn test_next_delay_saturates() {
        assert_eq!(next_delay(Duration::MAX, 1.5), Duration::MAX);
    }

    #[test]
    fn test_tiny_delay_still_grows() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_nanos(1))
            .with_factor(1.4);
        assert!(config.validate().is_ok());

        assert_eq!(next_delay(Duration::from_nanos(1), 1.4), Duration::from_nanos(2));
        let mut prev = config.delay_for_attempt(0);
        for attempt in 1..20 {
            let next = config.delay_for_attempt(attempt);
            assert!(next > prev, "attempt {}: {:?} <= {:?}", attempt, next, prev);
            prev = next;
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.initial_delay(), Duration::from_millis(200));
        assert_eq!(config.factor(), 1.5);
        assert_eq!(config.jitter(), &JitterStrategy::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(675));
    }

    #[test]
    fn test_validate_zero_initial_delay() {
        let config = RetryConfig::default().with_initial_delay(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroInitialDelay));
    }

    #[test]
    fn test_validate_rejects_shrinking_factor() {
        for factor in [1.0, 0.5, -2.0, f64::INFINITY] {
            let config = RetryConfig::default().with_factor(factor);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::NonGrowingFactor(_))
            ));
        }
        assert!(RetryConfig::default()
            .with_factor(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_with_jitter_clamps() {
        let config = RetryConfig::default().with_jitter(4.0);
        assert_eq!(config.jitter(), &JitterStrategy::Proportional(1.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_jitter_none_returns_delay() {
        let delay = Duration::from_millis(300);
        assert_eq!(JitterStrategy::None.apply(delay), delay);
    }

    #[cfg(feature = "jitter")]
    #[test]
    fn test_proportional_jitter_stays_in_range() {
        let jitter = JitterStrategy::Proportional(0.25);
        for _ in 0..100 {
            let d = jitter.apply(Duration::from_millis(400));
            assert!(d >= Duration::from_millis(300));
            assert!(d <= Duration::from_millis(500));
        }
    }

    #[cfg(feature = "jitter")]
    #[test]
    fn test_full_jitter_never_exceeds_delay() {
        for _ in 0..100 {
            assert!(JitterStrategy::Full.apply(Duration::from_millis(50)) <= Duration::from_millis(50));
        }
    }

    #[cfg(not(feature = "jitter"))]
    #[test]
    fn test_jitter_is_noop_without_feature() {
        let delay = Duration::from_millis(300);
        assert_eq!(JitterStrategy::Full.apply(delay), delay);
        assert_eq!(JitterStrategy::Proportional(0.5).apply(delay), delay);
    }
}
