//! Retry backoff state machine
//!
//! The provider throttles aggressively, so every window fetch runs through
//! this small explicit state machine: attempt count in, next delay out.
//! Delays grow exponentially, are capped, and carry a uniform jitter so
//! parallel deployments don't retry in lockstep.

use std::time::Duration;

use rand::Rng;

use crate::config::IngestSettings;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Jitter fraction j: each delay is scaled by a uniform draw in [1-j, 1+j].
    pub jitter: f64,
}

impl BackoffPolicy {
    pub fn from_settings(s: &IngestSettings) -> Self {
        Self {
            base: s.backoff_base,
            factor: s.backoff_factor,
            max_delay: s.backoff_max,
            max_attempts: s.max_attempts,
            jitter: s.jitter.clamp(0.0, 1.0),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&IngestSettings::default())
    }
}

/// One retry sequence. Create a fresh value per fetch.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay to sleep before the next attempt, or None once the attempt
    /// budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.policy.max_attempts {
            return None;
        }

        let exp = self.policy.base.as_secs_f64() * self.policy.factor.powi(self.attempt as i32);
        let capped = exp.min(self.policy.max_delay.as_secs_f64());

        let j = self.policy.jitter;
        let scale = if j > 0.0 {
            rand::thread_rng().gen_range(1.0 - j..=1.0 + j)
        } else {
            1.0
        };

        self.attempt += 1;
        Some(Duration::from_secs_f64(capped * scale))
    }
}
