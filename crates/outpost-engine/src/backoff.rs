// SPDX-License-Identifier: MIT

//! Restart backoff schedule: exponential with jitter,
//! `delay_k = min(cap, base * 2^k) * uniform(0.5, 1.5)`, reset when the
//! child has stayed up longer than `reset_window`.
//!
//! Split into a deterministic part ([`unjittered_delay`]) and jitter
//! application so the formula itself is testable without a source of
//! randomness.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub reset_window: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            reset_window: Duration::from_secs(60),
        }
    }
}

/// `min(cap, base * 2^attempt)`, before jitter is applied.
pub fn unjittered_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let exp = config.base.as_secs_f64() * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(exp.min(config.cap.as_secs_f64()))
}

/// Multiply `delay` by a uniform random factor in `[0.5, 1.5)`.
pub fn apply_jitter(delay: Duration, rng: &mut impl Rng) -> Duration {
    let factor: f64 = rng.gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Tracks the restart attempt counter across a supervisor's lifetime,
/// resetting it once the child has proven stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartCounter {
    attempt: u32,
}

impl RestartCounter {
    /// Record that the child just exited after having been up for
    /// `uptime`. Resets the counter if `uptime >= reset_window`.
    pub fn record_exit(&mut self, uptime: Duration, config: &BackoffConfig) {
        if uptime >= config.reset_window {
            self.attempt = 0;
        }
    }

    /// Delay to use for the next restart, advancing the attempt counter.
    pub fn next_delay(&mut self, config: &BackoffConfig, rng: &mut impl Rng) -> Duration {
        let delay = apply_jitter(unjittered_delay(config, self.attempt), rng);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}
