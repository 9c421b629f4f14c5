//! Repeating status checks driven by the scheduler

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::scheduler::{SchedulerHandle, Task, TaskClass, TaskHandle, TaskId, panic_message};

use super::backoff::Backoff;
use super::config::PollingConfig;

/// Result of one check
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// Not there yet; check again later
    Pending(T),
    /// Done; stop polling
    Ready(T),
}

/// Progress reported by a poll loop
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent<T> {
    /// A check is starting
    Polling { attempt: u32 },
    /// The check came back pending
    Pending { attempt: u32, value: T },
    /// The check came back ready
    Ready { attempt: u32, value: T },
    /// The check came back pending after the deadline
    Expired { attempt: u32, value: T },
    /// The check itself failed
    Failed { attempt: u32, error: String },
}

impl<T> PollEvent<T> {
    /// No further events follow a terminal one
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Polling { .. } | Self::Pending { .. })
    }

    pub fn attempt(&self) -> u32 {
        match self {
            Self::Polling { attempt }
            | Self::Pending { attempt, .. }
            | Self::Ready { attempt, .. }
            | Self::Expired { attempt, .. }
            | Self::Failed { attempt, .. } => *attempt,
        }
    }
}

/// How a poll loop is submitted and spaced
#[derive(Clone, Default)]
pub struct PollOptions {
    pub class: TaskClass,
    pub initial_delay: Duration,
    /// Without a backoff the loop checks exactly once
    pub backoff: Option<Arc<dyn Backoff>>,
    /// Pending results after this instant end the loop as expired
    pub expires_at: Option<DateTime<Utc>>,
}

impl PollOptions {
    pub fn with_class(mut self, class: TaskClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        let options = Self::default()
            .with_class(config.class)
            .with_initial_delay(config.initial_delay());
        match &config.backoff {
            Some(backoff) => options.with_backoff(backoff.clone()),
            None => options,
        }
    }
}

impl std::fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("class", &self.class)
            .field("initial_delay", &self.initial_delay)
            .field("backoff", &self.backoff.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// State shared between the subscription and the scheduled task
struct PollLoop<T> {
    active: AtomicBool,
    attempts: AtomicU32,
    /// Both cleared when the loop stops, closing the event stream and
    /// releasing the task's own handle
    events: Mutex<Option<mpsc::UnboundedSender<PollEvent<T>>>>,
    handle: Mutex<Option<TaskHandle>>,
}

impl<T> PollLoop<T> {
    fn emit(&self, event: PollEvent<T>) {
        if let Ok(events) = self.events.lock()
            && let Some(events) = events.as_ref()
        {
            let _ = events.send(event);
        }
    }

    /// Emit a terminal event and stop
    fn finish(&self, event: PollEvent<T>) {
        self.emit(event);
        self.stop();
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Ok(mut handle) = self.handle.lock() {
            handle.take();
        }
        if let Ok(mut events) = self.events.lock() {
            events.take();
        }
    }

    /// Re-arm the check unless the loop has stopped
    ///
    /// The handle lock is held through the send so a concurrent `stop` cannot
    /// slip its cancel in ahead of this request.
    fn reschedule(&self, delay: Duration) -> Result<(), SchedulerError> {
        let Ok(guard) = self.handle.lock() else {
            return Ok(());
        };
        match guard.as_ref() {
            Some(handle) if self.active.load(Ordering::SeqCst) => handle.reschedule(delay),
            _ => Ok(()),
        }
    }
}

/// Receiving end of a poll loop
pub struct PollSubscription<T> {
    id: TaskId,
    events: mpsc::UnboundedReceiver<PollEvent<T>>,
    state: Arc<PollLoop<T>>,
    handle: TaskHandle,
}

impl<T> PollSubscription<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the loop may still produce checks
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the loop has stopped and every event was read.
    pub async fn next_event(&mut self) -> Option<PollEvent<T>> {
        self.events.recv().await
    }

    /// Stop the loop and drop any pending check
    ///
    /// A check already in flight finishes but emits nothing further.
    pub fn cancel(&self) -> Result<(), SchedulerError> {
        debug!(id = %self.id, "PollSubscription::cancel: called");
        self.state.stop();
        self.handle.cancel()
    }
}

/// Dropping the subscription cancels the loop
impl<T> Drop for PollSubscription<T> {
    fn drop(&mut self) {
        if self.is_active() {
            let _ = self.cancel();
        }
    }
}

/// Start a poll loop that runs `check` under the scheduler's rate limit
///
/// Each check is a deferred task. A pending result re-arms the task after
/// `backoff.delay(attempt)`; a ready, expired or failed result ends the loop.
pub fn poll<T, F, Fut>(
    scheduler: &SchedulerHandle,
    label: impl Into<String>,
    options: PollOptions,
    check: F,
) -> Result<PollSubscription<T>, SchedulerError>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<PollStatus<T>>> + Send + 'static,
{
    let label = label.into();
    debug!(%label, ?options, "poll: called");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let state = Arc::new(PollLoop {
        active: AtomicBool::new(true),
        attempts: AtomicU32::new(0),
        events: Mutex::new(Some(events_tx)),
        handle: Mutex::new(None),
    });
    let check = Arc::new(check);

    let task_state = state.clone();
    let PollOptions {
        class,
        initial_delay,
        backoff,
        expires_at,
    } = options;
    let task_label = label.clone();
    let task = Task::deferred(label, move || {
        let state = task_state.clone();
        let check = check.clone();
        let backoff = backoff.clone();
        let label = task_label.clone();
        async move {
            if !state.active.load(Ordering::SeqCst) {
                return Ok(());
            }
            let attempt = state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            state.emit(PollEvent::Polling { attempt });

            let outcome = match AssertUnwindSafe(async { (*check)().await }).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let error = panic_message(payload.as_ref());
                    warn!(%label, attempt, %error, "Poll check panicked");
                    state.finish(PollEvent::Failed {
                        attempt,
                        error: error.clone(),
                    });
                    return Err(eyre::eyre!("poll check {} {}", attempt, error));
                }
            };
            if !state.active.load(Ordering::SeqCst) {
                debug!(%label, attempt, "poll: cancelled while checking");
                return Ok(());
            }

            match outcome {
                Ok(PollStatus::Ready(value)) => {
                    debug!(%label, attempt, "poll: ready");
                    state.finish(PollEvent::Ready { attempt, value });
                }
                Ok(PollStatus::Pending(value)) if expires_at.is_some_and(|at| Utc::now() >= at) => {
                    debug!(%label, attempt, "poll: expired");
                    state.finish(PollEvent::Expired { attempt, value });
                }
                Ok(PollStatus::Pending(value)) => {
                    state.emit(PollEvent::Pending { attempt, value });
                    match &backoff {
                        Some(backoff) => {
                            let delay = backoff.delay(attempt);
                            debug!(%label, attempt, ?delay, "poll: pending, rescheduling");
                            if let Err(e) = state.reschedule(delay) {
                                warn!(%label, attempt, error = %e, "Poll loop could not reschedule");
                                state.finish(PollEvent::Failed {
                                    attempt,
                                    error: e.to_string(),
                                });
                            }
                        }
                        None => {
                            debug!(%label, attempt, "poll: pending without backoff, stopping");
                            state.stop();
                        }
                    }
                }
                Err(e) => {
                    state.finish(PollEvent::Failed {
                        attempt,
                        error: format!("{:#}", e),
                    });
                    return Err(e.wrap_err(format!("poll check {} failed", attempt)));
                }
            }
            Ok(())
        }
    });

    let handle = scheduler.prepare(class, task);
    if let Ok(mut slot) = state.handle.lock() {
        *slot = Some(handle.clone());
    }
    if let Err(e) = handle.reschedule(initial_delay) {
        state.stop();
        return Err(e);
    }

    Ok(PollSubscription {
        id: handle.id(),
        events: events_rx,
        state,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Scheduler, SchedulerConfig};

    fn poll_loop(scheduler: &SchedulerHandle, active: bool) -> PollLoop<()> {
        let (events_tx, _) = mpsc::unbounded_channel();
        let handle = scheduler.prepare(TaskClass::Regular, Task::new("check", || Ok(())));
        PollLoop {
            active: AtomicBool::new(active),
            attempts: AtomicU32::new(0),
            events: Mutex::new(Some(events_tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(!PollEvent::<()>::Polling { attempt: 1 }.is_terminal());
        assert!(!PollEvent::Pending { attempt: 1, value: () }.is_terminal());
        assert!(PollEvent::Ready { attempt: 2, value: () }.is_terminal());
        assert!(PollEvent::Expired { attempt: 3, value: () }.is_terminal());
        assert!(
            PollEvent::<()>::Failed {
                attempt: 4,
                error: "x".to_string()
            }
            .is_terminal()
        );
        assert_eq!(PollEvent::Ready { attempt: 2, value: () }.attempt(), 2);
    }

    #[test]
    fn test_options_from_config() {
        let options = PollOptions::from(&PollingConfig::default());
        assert_eq!(options.class, TaskClass::Regular);
        assert!(options.backoff.is_some());

        let config = PollingConfig {
            backoff: None,
            initial_delay_ms: 40,
            class: TaskClass::Priority,
        };
        let options = PollOptions::from(&config);
        assert!(options.backoff.is_none());
        assert_eq!(options.initial_delay, Duration::from_millis(40));
        assert_eq!(options.class, TaskClass::Priority);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_skipped_once_stopping() {
        let (scheduler, _join) = Scheduler::spawn(SchedulerConfig::default()).unwrap();

        // stop has cleared the flag but not yet taken the handle
        let stopping = poll_loop(&scheduler, false);
        stopping.reschedule(Duration::ZERO).unwrap();

        let stopped = poll_loop(&scheduler, true);
        stopped.stop();
        stopped.reschedule(Duration::ZERO).unwrap();

        let running = poll_loop(&scheduler, true);
        running.reschedule(Duration::from_secs(60)).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = scheduler.queue_state().await.unwrap();
        assert_eq!(state.stats.total_scheduled, 1);
        assert_eq!(state.pending_timers, 1);
    }
}
