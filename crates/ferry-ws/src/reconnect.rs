use std::time::Duration;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
/// Upper bound on the reconnection delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Doubling reconnect backoff, capped at `max_delay`.
///
/// `current_delay` is the delay the next abnormal close will wait. Each
/// [`advance`](Self::advance) hands that out and doubles it for the time
/// after; [`reset`](Self::reset) puts it back to `base_delay` once a
/// connection opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    current_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl BackoffPolicy {
    /// Create a policy starting at `base_delay`.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            current_delay: base_delay,
        }
    }

    /// `min(max(previous, base) * 2, max)`.
    pub fn next_delay(previous: Duration, base_delay: Duration, max_delay: Duration) -> Duration {
        previous
            .max(base_delay)
            .saturating_mul(2)
            .min(max_delay)
    }

    /// Take the delay for this reconnect attempt and grow the next one.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current_delay.min(self.max_delay);
        self.current_delay = Self::next_delay(self.current_delay, self.base_delay, self.max_delay);
        delay
    }

    /// Back to the base delay. Called on every successful open.
    pub fn reset(&mut self) {
        self.current_delay = self.base_delay;
    }

    /// The delay the next abnormal close would wait.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("Base reconnect delay must be > 0".to_string());
        }
        if self.max_delay.is_zero() {
            return Err("Max reconnect delay must be > 0".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("Max reconnect delay must be >= base reconnect delay".to_string());
        }
        Ok(())
    }
}
