//! Scheduler error types

use thiserror::Error;

use crate::scheduler::TaskId;

/// Errors surfaced by the scheduler API
///
/// Task failures are not part of this enum: they are isolated by the drain
/// loop and reported through tracing and the event bus.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler has shut down")]
    Closed,

    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("Task {id} was cancelled before producing a result")]
    Cancelled { id: TaskId },

    #[error("Task {id} failed before producing a result: {error}")]
    Failed { id: TaskId, error: String },
}

impl SchedulerError {
    /// Check if the scheduler is gone for good
    pub fn is_closed(&self) -> bool {
        matches!(self, SchedulerError::Closed)
    }
}
