//! Units of work accepted by the scheduler

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Outcome of a task body
pub type TaskResult = eyre::Result<()>;

/// Which queue a task is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Priority,
    #[default]
    Regular,
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority => write!(f, "priority"),
            Self::Regular => write!(f, "regular"),
        }
    }
}

impl std::str::FromStr for TaskClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "priority" => Ok(Self::Priority),
            "regular" => Ok(Self::Regular),
            _ => Err(format!("Unknown task class: {}", s)),
        }
    }
}

/// Identifier of a scheduled entry, stable across reschedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What running a task body produced
pub enum TaskRun {
    /// The body ran to completion on the drain loop
    Finished(TaskResult),

    /// The body started a deferred operation; the scheduler spawns it and
    /// only watches for failure
    Deferred(BoxFuture<'static, TaskResult>),
}

/// A repeatable, zero-argument unit of work
///
/// Cloning is cheap: clones share the same body. The same task may run many
/// times when its handle is rescheduled.
#[derive(Clone)]
pub struct Task {
    label: Arc<str>,
    body: Arc<dyn Fn() -> TaskRun + Send + Sync>,
}

impl Task {
    /// A task whose body runs synchronously on the drain loop
    pub fn new<F>(label: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            body: Arc::new(move || TaskRun::Finished(body())),
        }
    }

    /// A task whose body starts an asynchronous operation
    pub fn deferred<F, Fut>(label: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            body: Arc::new(move || TaskRun::Deferred(Box::pin(body()))),
        }
    }

    /// A deferred task that runs its body at most once
    ///
    /// Later executions (after a reschedule) complete immediately.
    pub fn once<F, Fut>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let slot = Mutex::new(Some(body));
        Self {
            label: Arc::from(label.into()),
            body: Arc::new(move || {
                let body = slot.lock().ok().and_then(|mut guard| guard.take());
                match body {
                    Some(body) => TaskRun::Deferred(Box::pin(body())),
                    None => TaskRun::Finished(Ok(())),
                }
            }),
        }
    }

    /// Human-readable label used in logs and events
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn run(&self) -> TaskRun {
        (self.body)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Describe a caught panic payload as a failure message
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
