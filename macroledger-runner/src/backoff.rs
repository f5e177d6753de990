//! Bounded retry with an injectable clock.
//!
//! The orchestrator retries the store connection through a `BackoffPolicy`.
//! Sleeping goes through `Clock` so tests can substitute a fake that only
//! records requested delays.

use crate::config::RetryConfig;
use rand::Rng;
use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};

pub trait Clock {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Clock that never blocks; it records every requested sleep.
#[derive(Debug, Default)]
pub struct FakeClock {
    slept: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// All attempts failed; carries the last error.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Symmetric jitter applied to each delay, in percent of the delay.
    pub jitter_percent: u8,
}

impl BackoffPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter_percent: 0,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    pub fn delay<R: Rng>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.nominal_delay(retry);
        if self.jitter_percent == 0 || base.is_zero() {
            return base;
        }
        let spread = f64::from(self.jitter_percent.min(100)) / 100.0;
        let factor = rng.gen_range((1.0 - spread)..=(1.0 + spread));
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }

    /// Calls `op` until it succeeds or `max_attempts` calls have failed.
    /// `op` receives the 1-based attempt number.
    pub fn retry<T, E, F>(&self, clock: &dyn Clock, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut rng = rand::thread_rng();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    info!(attempt, "{label} succeeded");
                    return Ok(value);
                }
                Err(e) if attempt >= attempts => {
                    warn!(attempt, "{label} failed: {e}; giving up");
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay(attempt, &mut rng);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "{label} failed: {e}");
                    clock.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            jitter_percent: config.jitter_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn default_config_is_fixed_five_second_schedule() {
        let policy = BackoffPolicy::from(&RetryConfig::default());
        assert_eq!(policy.max_attempts, 5);
        for retry in 1..=4 {
            assert_eq!(policy.nominal_delay(retry), Duration::from_secs(5));
        }
    }

    #[test]
    fn exponential_schedule_is_capped() {
        let policy = BackoffPolicy {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
            jitter_percent: 0,
        };
        let delays: Vec<u128> = (1..=5).map(|r| policy.nominal_delay(r).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            jitter_percent: 20,
            ..BackoffPolicy::fixed(3, Duration::from_secs(10))
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let d = policy.delay(1, &mut rng);
            assert!(d >= Duration::from_millis(7_999) && d <= Duration::from_millis(12_001));
        }
    }

    #[test]
    fn retry_succeeds_after_transient_failures() {
        let clock = FakeClock::new();
        let policy = BackoffPolicy::fixed(5, Duration::from_secs(5));
        let result = policy.retry(&clock, "connect", |attempt| {
            if attempt < 3 {
                Err(format!("refused on attempt {attempt}"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn retry_is_bounded() {
        let clock = FakeClock::new();
        let policy = BackoffPolicy::fixed(4, Duration::from_secs(5));
        let mut calls = 0;
        let result: Result<(), _> = policy.retry(&clock, "connect", |_| {
            calls += 1;
            Err("down")
        });
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last_error, "down");
        assert_eq!(calls, 4);
        assert_eq!(clock.sleeps().iter().sum::<Duration>(), Duration::from_secs(15));
    }
}
