//! Error types for retry configuration.
//!
//! Operation failures never surface here: they are absorbed by the retry loop.
//! The only fallible API is building a factory from a bad [`RetryConfig`].
//!
//! [`RetryConfig`]: super::RetryConfig

/// Error returned when a [`RetryConfig`](super::RetryConfig) would not produce a
/// strictly growing schedule.
///
/// # Examples
///
/// ```rust
/// use relentless::{ConfigError, RetryConfig};
///
/// let config = RetryConfig::default().with_factor(1.0);
/// assert_eq!(config.validate(), Err(ConfigError::NonGrowingFactor(1.0)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The initial delay was zero.
    ZeroInitialDelay,
    /// The growth factor was not a finite number greater than one.
    NonGrowingFactor(f64),
    /// The proportional jitter factor was outside `0.0..=1.0`.
    InvalidJitter(f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroInitialDelay => write!(f, "initial retry delay must be non-zero"),
            Self::NonGrowingFactor(factor) => {
                write!(f, "backoff factor must be finite and > 1.0 (got {})", factor)
            }
            Self::InvalidJitter(j) => write!(f, "jitter must be within 0.0..=1.0 (got {})", j),
        }
    }
}

impl std::error::Error for ConfigError {}
