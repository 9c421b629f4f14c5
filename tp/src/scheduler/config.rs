//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::SchedulerError;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum tokens the bucket can hold (burst size)
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Milliseconds needed to accrue one whole token
    #[serde(rename = "refill-interval-ms", default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,

    /// Fraction of capacity at or above which regular work may borrow a priority turn
    #[serde(rename = "high-capacity-fraction", default = "default_high_capacity_fraction")]
    pub high_capacity_fraction: f64,

    /// Tokens available when the scheduler starts
    #[serde(rename = "initial-tokens", default)]
    pub initial_tokens: f64,

    /// Buffered scheduler events per subscriber
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_capacity() -> u32 {
    5
}

fn default_refill_interval_ms() -> u64 {
    3000
}

fn default_high_capacity_fraction() -> f64 {
    1.0
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval_ms: default_refill_interval_ms(),
            high_capacity_fraction: default_high_capacity_fraction(),
            initial_tokens: 0.0,
            event_capacity: default_event_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Get the refill interval as a Duration
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    /// Absolute token count at which regular work may take priority turns
    pub fn high_capacity_threshold(&self) -> f64 {
        f64::from(self.capacity) * self.high_capacity_fraction
    }

    /// Reject settings the token bucket cannot honor
    pub fn validate(&self) -> Result<(), SchedulerError> {
        debug!(?self, "SchedulerConfig::validate: called");
        if self.capacity == 0 {
            return Err(SchedulerError::InvalidConfig("capacity must be at least 1".to_string()));
        }
        if self.refill_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "refill-interval-ms must be greater than 0".to_string(),
            ));
        }
        if !(self.high_capacity_fraction > 0.0 && self.high_capacity_fraction <= 1.0) {
            return Err(SchedulerError::InvalidConfig(format!(
                "high-capacity-fraction must be in (0, 1], got {}",
                self.high_capacity_fraction
            )));
        }
        if !(0.0..=f64::from(self.capacity)).contains(&self.initial_tokens) {
            return Err(SchedulerError::InvalidConfig(format!(
                "initial-tokens must be between 0 and {}, got {}",
                self.capacity, self.initial_tokens
            )));
        }
        if self.event_capacity == 0 {
            return Err(SchedulerError::InvalidConfig("event-capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
