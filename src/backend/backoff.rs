//! Exponential backoff with jitter for transient provider failures.
//!
//! [`BackoffConfig`] bounds how many times a request may hit the provider
//! and how long to wait between attempts. Delays grow as
//! `base_delay * multiplier^attempt`, are clamped to `[min_delay, max_delay]`,
//! and jitter is drawn inside that band so it never drops below `min_delay`.

use std::time::Duration;

/// Retry bound and delay policy for provider calls.
///
/// # Example
///
/// ```
/// use story_pipeline::backend::BackoffConfig;
///
/// let standard = BackoffConfig::standard();
/// assert_eq!(standard.max_attempts, 3);
///
/// let once = BackoffConfig::none();
/// assert_eq!(once.max_attempts, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Total provider calls allowed per request, first call included. Default: 3.
    pub max_attempts: u32,

    /// Unclamped delay before the first retry. Default: 1 second.
    pub base_delay: Duration,

    /// Growth factor per attempt. Default: 2.0.
    pub multiplier: f64,

    /// Lower bound on every delay. Default: 2 seconds.
    pub min_delay: Duration,

    /// Upper bound on every delay. Default: 10 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: Full.
    pub jitter: JitterStrategy,

    /// Use the provider's `Retry-After` hint (still clamped). Default: `true`.
    pub respect_retry_after: bool,
}

/// Jitter strategy to keep concurrent requests from retrying in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the clamped value.
    None,

    /// Random value in `[min_delay, clamped]`.
    Full,

    /// Upper half of the band: `[mid, clamped]` where `mid` is halfway from
    /// `min_delay` to `clamped`.
    Equal,
}

impl BackoffConfig {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::standard()
        }
    }

    /// 3 attempts, 1s base, 2x growth, clamped to 2s..10s, full jitter.
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::Full,
            respect_retry_after: true,
        }
    }

    /// Check the bounds are coherent.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.base_delay.is_zero() {
            return Err("base_delay must be non-zero".into());
        }
        if self.min_delay > self.max_delay {
            return Err(format!(
                "min_delay ({:?}) exceeds max_delay ({:?})",
                self.min_delay, self.max_delay
            ));
        }
        if !(self.multiplier >= 1.0) {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        Ok(())
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let lo = self.min_delay.as_secs_f64();
        let hi = self.max_delay.as_secs_f64().max(lo);
        // Overflowed growth (or 0 * inf) means the cap.
        let capped = if raw.is_finite() { raw.clamp(lo, hi) } else { hi };

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => lo + fastrand::f64() * (capped - lo),
            JitterStrategy::Equal => {
                let mid = lo + (capped - lo) / 2.0;
                mid + fastrand::f64() * (capped - mid)
            }
        };

        Duration::from_secs_f64(jittered)
    }

    /// Delay honouring a provider hint when configured to.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => hint.max(self.min_delay).min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::standard()
    }
}
