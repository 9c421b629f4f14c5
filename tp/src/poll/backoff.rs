//! Backoff policies for polling loops

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maps the number of completed attempts to the delay before the next one
pub trait Backoff: Send + Sync {
    /// Delay to wait after attempt number `attempt` (1-based)
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// Exponential backoff with an optional cap and random jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    /// Delay after the first attempt
    #[serde(rename = "initial-ms", default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Growth factor per attempt
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Upper bound on any single delay
    #[serde(rename = "max-ms", default)]
    pub max_ms: Option<u64>,

    /// Fraction of the delay randomly added or removed (0 disables)
    #[serde(default)]
    pub jitter: f64,
}

fn default_initial_ms() -> u64 {
    5000
}

fn default_factor() -> f64 {
    2.0
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            factor: default_factor(),
            max_ms: Some(300_000),
            jitter: 0.0,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, factor: f64) -> Self {
        Self {
            initial_ms: initial.as_millis() as u64,
            factor,
            max_ms: None,
            jitter: 0.0,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max_ms = Some(max.as_millis() as u64);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    fn base_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_ms as f64 * self.factor.powi(exponent);
        match self.max_ms {
            Some(max) => delay.min(max as f64),
            None => delay,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let mut delay_ms = self.base_delay_ms(attempt);
        if !delay_ms.is_finite() {
            return self.max_ms.map(Duration::from_millis).unwrap_or(Duration::MAX);
        }
        if self.jitter > 0.0 {
            let spread = delay_ms * self.jitter.min(1.0);
            delay_ms += rand::rng().random_range(-spread..=spread);
        }
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}
