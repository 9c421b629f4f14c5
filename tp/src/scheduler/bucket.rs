//! Token bucket for admission control

use std::time::Duration;

use tokio::time::Instant;

/// Lazily refilled token bucket
///
/// Tokens are real-valued: one whole token accrues per `refill_interval`,
/// and the count is clamped to `[0, capacity]`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket holding `initial_tokens`, last refilled at `now`
    pub fn new(capacity: f64, refill_interval: Duration, initial_tokens: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: initial_tokens.clamp(0.0, capacity),
            refill_interval,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Account for the time elapsed since the last refill
    pub fn refill(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let accrued = elapsed.as_secs_f64() / self.refill_interval.as_secs_f64();
        self.tokens = (self.tokens + accrued).min(self.capacity);
        self.last_refill = now;
        self.tokens
    }

    /// Tokens that would be available at `now`, without updating the bucket
    pub fn available(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill);
        (self.tokens + elapsed.as_secs_f64() / self.refill_interval.as_secs_f64()).min(self.capacity)
    }

    /// At least one whole token is available
    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Spend one whole token if available
    pub fn try_consume(&mut self) -> bool {
        if !self.has_token() {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    /// Time until the next whole token accrues
    ///
    /// Zero when a token is already available.
    pub fn time_until_next_token(&self) -> Duration {
        let missing = (1.0 - self.tokens).max(0.0);
        self.refill_interval.mul_f64(missing)
    }
}
