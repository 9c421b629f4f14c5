//! Event types for scheduler activity streaming
//!
//! These events mirror what the scheduler logs through tracing:
//! - Entry lifecycle (scheduled, admitted, started, removed)
//! - Task failures isolated by the drain loop
//! - Drain loop parking while it waits for tokens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::{TaskClass, TaskId};

/// Core event enum - the vocabulary of scheduler activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchedulerEvent {
    /// A timer was armed for an entry (submit or reschedule)
    TaskScheduled {
        task_id: TaskId,
        class: TaskClass,
        label: String,
        delay_ms: u64,
    },
    /// An entry's timer fired and the task joined its queue
    TaskAdmitted {
        task_id: TaskId,
        class: TaskClass,
        label: String,
    },
    /// The drain loop handed the task a token and ran it
    TaskStarted {
        task_id: TaskId,
        class: TaskClass,
        label: String,
        tokens_before: f64,
    },
    /// An entry was cancelled before it ran
    TaskRemoved {
        task_id: TaskId,
        class: TaskClass,
        label: String,
        /// Whether a queued node (not just a timer) was removed
        was_queued: bool,
    },
    /// A task returned an error, panicked, or its deferred operation failed
    TaskFailed {
        task_id: TaskId,
        class: TaskClass,
        label: String,
        error: String,
    },
    /// Work remains but tokens ran out; the drain loop sleeps until the next token
    DrainParked {
        tokens: f64,
        wake_in_ms: u64,
        priority_queued: usize,
        regular_queued: usize,
    },
}

impl SchedulerEvent {
    /// Get the task ID for this event, if it concerns a single task
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            SchedulerEvent::TaskScheduled { task_id, .. }
            | SchedulerEvent::TaskAdmitted { task_id, .. }
            | SchedulerEvent::TaskStarted { task_id, .. }
            | SchedulerEvent::TaskRemoved { task_id, .. }
            | SchedulerEvent::TaskFailed { task_id, .. } => Some(*task_id),
            SchedulerEvent::DrainParked { .. } => None,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::TaskScheduled { .. } => "TaskScheduled",
            SchedulerEvent::TaskAdmitted { .. } => "TaskAdmitted",
            SchedulerEvent::TaskStarted { .. } => "TaskStarted",
            SchedulerEvent::TaskRemoved { .. } => "TaskRemoved",
            SchedulerEvent::TaskFailed { .. } => "TaskFailed",
            SchedulerEvent::DrainParked { .. } => "DrainParked",
        }
    }
}

/// Event wrapped with a timestamp, as written by `tp --json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SchedulerEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: SchedulerEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
