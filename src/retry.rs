// src/retry.rs
//! Bounded retry policy and the clock it sleeps on.
//!
//! The policy only computes delays; whoever retries decides *what* is
//! retryable. Sleeping goes through [`Sleeper`] so tests can swap in
//! [`RecordingSleeper`] and assert on the schedule without waiting.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use rand::Rng;

use crate::config::consts::*;

/// Exponential backoff with a cap and proportional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Up to this fraction of the delay is added at random.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits; handy for tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter_ratio: 0.0,
        }
    }

    /// Whether retry number `retry` (0-indexed) is within budget.
    pub fn should_retry(&self, retry: u32) -> bool {
        retry < self.max_retries
    }

    /// Delay before retry number `retry`, without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(63) as i32);
        let ms = self.initial_delay.as_millis() as f64 * factor;
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before retry number `retry`, jitter drawn from `rng`.
    pub fn delay<R: Rng>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter_ratio <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rng.random_range(0.0..=self.jitter_ratio) * base.as_millis() as f64;
        base + Duration::from_millis(extra as u64)
    }
}

/* ---------------- Clock ---------------- */

pub trait Sleeper: Send + Sync {
    fn sleep(&self, d: Duration);
}

/// Real wall-clock sleeping.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

/// Fake clock: records every requested delay and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, d: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(1_000),
            jitter_ratio: 0.0,
        }
    }

    #[test]
    fn retry_budget() {
        let p = RetryPolicy { max_retries: 3, ..policy() };
        assert!(p.should_retry(0));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn exponential_then_capped() {
        let p = policy();
        let ms: Vec<u128> = (0..6).map(|r| p.base_delay(r).as_millis()).collect();
        assert_eq!(ms, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let p = RetryPolicy { jitter_ratio: 0.1, ..policy() };
        let mut rng = StdRng::seed_from_u64(7);
        for r in 0..4 {
            let base = p.base_delay(r);
            let d = p.delay(r, &mut rng);
            assert!(d >= base);
            assert!(d <= base + base / 10, "{d:?} vs {base:?}");
        }
    }

    #[test]
    fn immediate_policy_never_waits() {
        let p = RetryPolicy::immediate(4);
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..4).all(|r| p.delay(r, &mut rng).is_zero()));
    }

    #[test]
    fn recording_sleeper_collects() {
        let s = RecordingSleeper::new();
        s.sleep(Duration::from_millis(5));
        s.clone().sleep(Duration::from_millis(7));
        assert_eq!(s.total(), Duration::from_millis(12));
    }
}
