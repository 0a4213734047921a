//! Bounded-attempt retry state with exponential backoff.

use rand::Rng;
use std::time::Duration;

/// Backoff policy for one creative's extraction attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time.
    pub base_delay: Duration,
    /// Extra random delay as a fraction of the computed delay (0.0 disables).
    pub jitter_ratio: f64,
    /// Upper bound on the computed delay, before jitter.
    pub max_delay: Option<Duration>,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter_ratio: 0.0,
            max_delay: None,
        }
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// `base_delay * 2^attempt` capped at `max_delay`, without jitter.
    /// `attempt` is zero-based.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Delay plus uniform jitter in `[0, jitter_ratio * delay)`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let max_jitter = delay.as_secs_f64() * self.jitter_ratio;
        let jitter = rand::rng().random_range(0.0..max_jitter);
        delay + Duration::from_secs_f64(jitter)
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 0,
            max_attempts: self.max_attempts,
        }
    }
}

/// Where the retry loop goes after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryStep {
    /// Sleep for `delay`, then run attempt number `attempt` (zero-based).
    Retry { attempt: u32, delay: Duration },
    /// No attempts left.
    Exhausted,
}

/// Attempt counter for one retry loop.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
}

impl RetryState {
    /// Zero-based index of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// One-based attempt number, for logs.
    pub fn display_attempt(&self) -> u32 {
        self.attempt + 1
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failed attempt and decide what happens next.
    pub fn on_failure(&mut self, backoff: &Backoff) -> RetryStep {
        if self.attempt + 1 >= self.max_attempts {
            return RetryStep::Exhausted;
        }
        let delay = backoff.jittered_delay(self.attempt);
        self.attempt += 1;
        RetryStep::Retry {
            attempt: self.attempt,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays() {
        let backoff = Backoff::new(3, Duration::from_millis(2500));
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(2500));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(10));
    }

    #[test]
    fn test_max_delay_caps_growth() {
        let backoff = Backoff::new(5, Duration::from_secs(1)).with_max_delay(Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(30), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_bounds() {
        let backoff = Backoff::new(3, Duration::from_secs(60)).with_jitter(0.1);
        for _ in 0..50 {
            let delay = backoff.jittered_delay(1);
            assert!(delay >= Duration::from_secs(120));
            assert!(delay < Duration::from_secs(132));
        }
    }

    #[test]
    fn test_state_machine_is_bounded() {
        let backoff = Backoff::new(3, Duration::from_secs(1));
        let mut state = backoff.start();

        assert_eq!(
            state.on_failure(&backoff),
            RetryStep::Retry {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            state.on_failure(&backoff),
            RetryStep::Retry {
                attempt: 2,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(state.on_failure(&backoff), RetryStep::Exhausted);
        assert_eq!(state.on_failure(&backoff), RetryStep::Exhausted);
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let backoff = Backoff::new(0, Duration::from_secs(1));
        assert_eq!(backoff.max_attempts, 1);
        assert_eq!(backoff.start().on_failure(&backoff), RetryStep::Exhausted);
    }
}
