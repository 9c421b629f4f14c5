//! Message types for the scheduler task

use std::time::Duration;

use tokio::sync::oneshot;

use super::queue::QueueState;
use super::task::{Task, TaskClass, TaskId};

/// Internal requests to the scheduler task
#[derive(Debug)]
pub(crate) enum SchedulerRequest {
    /// Arm (or re-arm) the timer for an entry; zero delay admits right away
    Schedule {
        id: TaskId,
        class: TaskClass,
        task: Task,
        delay: Duration,
    },

    /// A delay timer elapsed
    Fire { id: TaskId, seq: u64 },

    /// Drop an entry's timer and any queued node
    Cancel { id: TaskId },

    /// A deferred task's future failed after the drain loop moved on
    TaskFailed {
        id: TaskId,
        class: TaskClass,
        label: String,
        error: String,
    },

    /// Snapshot of queue depths, tokens and counters
    QueueState { reply_tx: oneshot::Sender<QueueState> },

    /// Stop the scheduler, aborting outstanding timers
    Shutdown,
}
