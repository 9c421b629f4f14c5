//! Client handles for submitting work to the scheduler

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::error::SchedulerError;
use crate::events::{EventBus, SchedulerEvent};

use super::messages::SchedulerRequest;
use super::queue::QueueState;
use super::task::{Task, TaskClass, TaskId, panic_message};

/// Handle for callers to submit work to the scheduler
///
/// This handle is cloneable and every method that changes scheduler state is
/// a non-blocking send, so it can be used from inside running tasks.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerRequest>,
    next_id: Arc<AtomicU64>,
    events: EventBus,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SchedulerRequest>, next_id: Arc<AtomicU64>, events: EventBus) -> Self {
        Self { tx, next_id, events }
    }

    /// Create a handle for `task` without arming it
    ///
    /// Call [`TaskHandle::reschedule`] to start it. Useful when the task body
    /// needs its own handle before the first run.
    pub fn prepare(&self, class: TaskClass, task: Task) -> TaskHandle {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%id, %class, label = task.label(), "SchedulerHandle::prepare: called");
        TaskHandle {
            id,
            class,
            task,
            tx: self.tx.clone(),
        }
    }

    /// Submit regular work to run after `delay`
    pub fn submit(&self, task: Task, delay: Duration) -> Result<TaskHandle, SchedulerError> {
        self.submit_with(TaskClass::Regular, task, delay)
    }

    /// Submit priority work to run after `delay`
    pub fn submit_priority(&self, task: Task, delay: Duration) -> Result<TaskHandle, SchedulerError> {
        self.submit_with(TaskClass::Priority, task, delay)
    }

    /// Submit work of the given class to run after `delay`
    pub fn submit_with(&self, class: TaskClass, task: Task, delay: Duration) -> Result<TaskHandle, SchedulerError> {
        debug!(%class, label = task.label(), ?delay, "SchedulerHandle::submit_with: called");
        let handle = self.prepare(class, task);
        handle.reschedule(delay)?;
        Ok(handle)
    }

    /// Run a one-shot async operation under the rate limit and return its result
    ///
    /// The operation's own error is returned to the caller rather than
    /// reported as a task failure. A panic is both: the caller gets
    /// `SchedulerError::Failed` and the event bus sees `TaskFailed`.
    pub async fn execute<T, F, Fut>(&self, class: TaskClass, label: impl Into<String>, operation: F) -> eyre::Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let task = Task::once(label, move || async move {
            match AssertUnwindSafe(async move { operation().await }).catch_unwind().await {
                Ok(result) => {
                    let _ = result_tx.send(Ok(result));
                    Ok(())
                }
                Err(payload) => {
                    let error = panic_message(payload.as_ref());
                    let _ = result_tx.send(Err(error.clone()));
                    Err(eyre::eyre!(error))
                }
            }
        });

        let handle = self.submit_with(class, task, Duration::ZERO)?;
        let id = handle.id();
        debug!(%id, "SchedulerHandle::execute: waiting for result");
        match result_rx.await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => Err(SchedulerError::Failed { id, error }.into()),
            Err(_) => Err(SchedulerError::Cancelled { id }.into()),
        }
    }

    /// Get a snapshot of queue depths, tokens and counters
    pub async fn queue_state(&self) -> Result<QueueState, SchedulerError> {
        debug!("SchedulerHandle::queue_state: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest::QueueState { reply_tx })
            .map_err(|_| SchedulerError::Closed)?;
        reply_rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Ask the scheduler to stop; pending timers are aborted
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        debug!("SchedulerHandle::shutdown: called");
        self.tx.send(SchedulerRequest::Shutdown).map_err(|_| SchedulerError::Closed)
    }

    /// Whether the scheduler task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Cancel/reschedule handle for one submitted entry
///
/// The entry keeps its [`TaskId`] across reschedules. Calling `cancel` or
/// `reschedule` after the scheduler has discarded the entry is harmless:
/// cancel does nothing and reschedule re-arms the task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: TaskId,
    class: TaskClass,
    task: Task,
    tx: mpsc::UnboundedSender<SchedulerRequest>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn class(&self) -> TaskClass {
        self.class
    }

    pub fn label(&self) -> &str {
        self.task.label()
    }

    /// Drop the pending timer and any queued, not yet executed node
    pub fn cancel(&self) -> Result<(), SchedulerError> {
        debug!(id = %self.id, "TaskHandle::cancel: called");
        self.tx
            .send(SchedulerRequest::Cancel { id: self.id })
            .map_err(|_| SchedulerError::Closed)
    }

    /// Replace the pending timer with one firing after `delay`
    ///
    /// A node already admitted to a queue is left alone, so calling this from
    /// inside the task's own body arms exactly one further run.
    pub fn reschedule(&self, delay: Duration) -> Result<(), SchedulerError> {
        debug!(id = %self.id, ?delay, "TaskHandle::reschedule: called");
        self.tx
            .send(SchedulerRequest::Schedule {
                id: self.id,
                class: self.class,
                task: self.task.clone(),
                delay,
            })
            .map_err(|_| SchedulerError::Closed)
    }
}
