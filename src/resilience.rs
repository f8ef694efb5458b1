//! Failure classification, backoff and circuit breaking
//!
//! Two pieces cooperate here:
//! - a [`ResiliencePolicy`] turns an error into a [`FailureClass`]
//! - a [`CircuitBreaker`] folds classified failures into a [`Decision`]
//!
//! The default policy, [`MarkerPolicy`], is a text heuristic: an error whose
//! description contains one of the rate-limit markers is `RateLimited`. It sits
//! behind the trait so a structured error contract can replace it without
//! touching the batch processor.
//!
//! # Example
//!
//! ```
//! use docbatch::config::ResilienceConfig;
//! use docbatch::resilience::{CircuitBreaker, Decision};
//! use docbatch::types::FailureClass;
//!
//! let mut breaker = CircuitBreaker::new(&ResilienceConfig::default());
//! let decision = breaker.record_failure(FailureClass::Transient, "a.pdf", "boom");
//! assert_eq!(decision, Decision::Continue);
//! ```

use crate::config::ResilienceConfig;
use crate::error::{ConversionError, Error};
use crate::types::{AbortReason, FailureClass};
use rand::Rng;
use std::time::Duration;

/// Rate-limited failures that trip the breaker
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u32 = 3;

/// Consecutive failures of any class that trip the breaker
pub const DEFAULT_CONSECUTIVE_ERROR_THRESHOLD: u32 = 5;

/// Pause after a rate-limited failure
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

/// Case-insensitive markers identifying a rate-limited failure
pub const DEFAULT_RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "too many requests",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "quota exceeded",
    "http error",
];

/// Classifies a per-file failure
pub trait ResiliencePolicy: Send + Sync {
    /// Decide whether `error` is rate limiting, transient, or fatal
    fn classify(&self, error: &Error) -> FailureClass;
}

/// Marker-matching [`ResiliencePolicy`]
///
/// - local I/O errors (writing the artifact) are `Fatal`
/// - upstream HTTP errors and errors whose text contains a rate-limit marker
///   are `RateLimited`
/// - everything else is `Transient`
#[derive(Clone, Debug)]
pub struct MarkerPolicy {
    markers: Vec<String>,
}

impl MarkerPolicy {
    /// Create a policy matching the given markers
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Create a policy from the configured markers
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(&config.rate_limit_markers)
    }

    fn is_rate_limited(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.markers.iter().any(|marker| text.contains(marker))
    }
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_MARKERS)
    }
}

impl ResiliencePolicy for MarkerPolicy {
    fn classify(&self, error: &Error) -> FailureClass {
        match error {
            Error::Io(_) => FailureClass::Fatal,
            Error::Conversion(ConversionError::RateLimited { .. })
            | Error::Conversion(ConversionError::Http { .. }) => FailureClass::RateLimited,
            other if self.is_rate_limited(&other.to_string()) => FailureClass::RateLimited,
            _ => FailureClass::Transient,
        }
    }
}

/// What the processor does after a file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Move on to the next file
    Continue,
    /// Pause, then move on to the next file
    Backoff(Duration),
    /// Stop without starting another file
    Abort(AbortReason),
}

/// Consecutive-failure counters for one batch run
///
/// Both counters reset after a success. A rate-limited failure always advances
/// the rate-limit counter, and advances the consecutive-error counter unless
/// `rate_limits_count_toward_error_threshold` is off.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    rate_limit_threshold: u32,
    consecutive_error_threshold: u32,
    rate_limits_count_toward_errors: bool,
    backoff: Duration,
    jitter: bool,
    rate_limited: u32,
    consecutive_errors: u32,
}

impl CircuitBreaker {
    /// Create a breaker with zeroed counters
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            rate_limit_threshold: config.rate_limit_threshold,
            consecutive_error_threshold: config.consecutive_error_threshold,
            rate_limits_count_toward_errors: config.rate_limits_count_toward_error_threshold,
            backoff: config.rate_limit_backoff,
            jitter: config.backoff_jitter,
            rate_limited: 0,
            consecutive_errors: 0,
        }
    }

    /// Current rate-limit counter
    pub fn rate_limited(&self) -> u32 {
        self.rate_limited
    }

    /// Current consecutive-error counter
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Reset both counters after a successful conversion
    pub fn record_success(&mut self) {
        self.rate_limited = 0;
        self.consecutive_errors = 0;
    }

    /// Fold a classified failure into the counters and decide what comes next
    pub fn record_failure(&mut self, class: FailureClass, file: &str, error: &str) -> Decision {
        if class == FailureClass::Fatal {
            self.consecutive_errors += 1;
            return Decision::Abort(AbortReason::Fatal {
                file: file.to_string(),
                error: error.to_string(),
            });
        }

        let rate_limited = class == FailureClass::RateLimited;
        if rate_limited {
            self.rate_limited += 1;
            if self.rate_limited >= self.rate_limit_threshold {
                return Decision::Abort(AbortReason::RateLimitThreshold {
                    count: self.rate_limited,
                });
            }
        }

        if !rate_limited || self.rate_limits_count_toward_errors {
            self.consecutive_errors += 1;
            if self.consecutive_errors >= self.consecutive_error_threshold {
                return Decision::Abort(AbortReason::ConsecutiveErrors {
                    count: self.consecutive_errors,
                });
            }
        }

        if rate_limited {
            Decision::Backoff(self.backoff_delay())
        } else {
            Decision::Continue
        }
    }

    fn backoff_delay(&self) -> Duration {
        if self.jitter {
            add_jitter(self.backoff)
        } else {
            self.backoff
        }
    }
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
