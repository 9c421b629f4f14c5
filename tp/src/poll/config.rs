//! Polling configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::TaskClass;

use super::backoff::ExponentialBackoff;

/// Defaults applied to poll loops started from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before the first check
    #[serde(rename = "initial-delay-ms", default)]
    pub initial_delay_ms: u64,

    /// Queue the checks are submitted to
    #[serde(default)]
    pub class: TaskClass,

    /// Spacing between checks; without it a loop checks exactly once
    #[serde(default = "default_backoff")]
    pub backoff: Option<ExponentialBackoff>,
}

fn default_backoff() -> Option<ExponentialBackoff> {
    Some(ExponentialBackoff::default())
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            class: TaskClass::Regular,
            backoff: default_backoff(),
        }
    }
}

impl PollingConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}
