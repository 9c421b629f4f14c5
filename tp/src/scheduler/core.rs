//! Scheduler implementation

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::events::{EventBus, SchedulerEvent};

use super::bucket::TokenBucket;
use super::config::SchedulerConfig;
use super::handle::SchedulerHandle;
use super::messages::SchedulerRequest;
use super::queue::{DualQueue, FairnessCounter, QueueRemover, QueueState, SchedulerStats};
use super::task::{Task, TaskClass, TaskId, TaskResult, TaskRun, panic_message};

/// Shortest wait the drain loop parks for
const MIN_WAKE: Duration = Duration::from_millis(1);

/// A task waiting in one of the class queues
struct QueuedTask {
    id: TaskId,
    class: TaskClass,
    task: Task,
}

/// Delay timer armed for an entry
struct PendingTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Bookkeeping for one submitted entry
///
/// An entry lives while it has a pending timer or at least one queued node.
struct Entry {
    class: TaskClass,
    task: Task,
    timer: Option<PendingTimer>,
    /// Removers for admitted nodes, oldest first
    queued: VecDeque<QueueRemover>,
}

impl Entry {
    fn is_idle(&self) -> bool {
        self.timer.is_none() && self.queued.is_empty()
    }
}

/// The Scheduler rate-limits and orders submitted work
///
/// All queue mutation, token accounting and task execution happen on the
/// task running [`Scheduler::run`]; callers talk to it through
/// [`SchedulerHandle`]s.
pub struct Scheduler {
    config: SchedulerConfig,
    tx: mpsc::UnboundedSender<SchedulerRequest>,
    rx: mpsc::UnboundedReceiver<SchedulerRequest>,
    next_id: Arc<AtomicU64>,
    events: EventBus,
}

impl Scheduler {
    /// Create a new scheduler with the given configuration
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        debug!(?config, "Scheduler::new: called");
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);
        Ok(Self {
            config,
            tx,
            rx,
            next_id: Arc::new(AtomicU64::new(1)),
            events,
        })
    }

    /// Create a new scheduler and spawn its task on the current runtime
    pub fn spawn(config: SchedulerConfig) -> Result<(SchedulerHandle, JoinHandle<()>), SchedulerError> {
        let scheduler = Self::new(config)?;
        let handle = scheduler.handle();
        let join = tokio::spawn(scheduler.run());
        Ok((handle, join))
    }

    /// Get a handle for submitting work
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.tx.clone(), self.next_id.clone(), self.events.clone())
    }

    /// Run the scheduler task
    ///
    /// Runs until shutdown is requested or every handle has been dropped.
    pub async fn run(self) {
        let Scheduler {
            config, tx, mut rx, events, ..
        } = self;
        let mut core = SchedulerCore::new(config, tx.downgrade(), events);
        drop(tx);

        info!(
            capacity = core.config.capacity,
            refill_interval_ms = core.config.refill_interval_ms,
            "Scheduler started"
        );

        loop {
            let wake_at = core.wake_at;
            tokio::select! {
                request = rx.recv() => {
                    let Some(request) = request else {
                        debug!("Scheduler::run: all handles dropped");
                        break;
                    };
                    if !core.handle_request(request) {
                        break;
                    }
                    // Apply everything that arrived together before draining
                    let mut stopping = false;
                    while let Ok(request) = rx.try_recv() {
                        if !core.handle_request(request) {
                            stopping = true;
                            break;
                        }
                    }
                    if stopping {
                        break;
                    }
                    core.try_drain();
                }
                _ = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    debug!("Scheduler::run: wake timer fired");
                    core.wake_at = None;
                    core.drain();
                }
            }
        }

        core.shutdown();
        info!("Scheduler stopped");
    }
}

/// State owned by the scheduler task
struct SchedulerCore {
    config: SchedulerConfig,
    queue: DualQueue<QueuedTask>,
    bucket: TokenBucket,
    entries: HashMap<TaskId, Entry>,
    /// Set while the drain loop is parked waiting for the next token
    wake_at: Option<Instant>,
    tx: mpsc::WeakUnboundedSender<SchedulerRequest>,
    events: EventBus,
    stats: SchedulerStats,
    timer_seq: u64,
}

impl SchedulerCore {
    fn new(config: SchedulerConfig, tx: mpsc::WeakUnboundedSender<SchedulerRequest>, events: EventBus) -> Self {
        let bucket = TokenBucket::new(
            f64::from(config.capacity),
            config.refill_interval(),
            config.initial_tokens,
            Instant::now(),
        );
        Self {
            config,
            queue: DualQueue::new(),
            bucket,
            entries: HashMap::new(),
            wake_at: None,
            tx,
            events,
            stats: SchedulerStats::default(),
            timer_seq: 0,
        }
    }

    /// Apply one request; returns false when the scheduler should stop
    fn handle_request(&mut self, request: SchedulerRequest) -> bool {
        match request {
            SchedulerRequest::Schedule { id, class, task, delay } => self.schedule(id, class, task, delay),
            SchedulerRequest::Fire { id, seq } => self.fire(id, seq),
            SchedulerRequest::Cancel { id } => self.cancel(id),
            SchedulerRequest::TaskFailed {
                id,
                class,
                label,
                error,
            } => self.report_failure(id, class, &label, error),
            SchedulerRequest::QueueState { reply_tx } => {
                let _ = reply_tx.send(self.queue_state());
            }
            SchedulerRequest::Shutdown => {
                info!("Scheduler shutdown requested");
                return false;
            }
        }
        true
    }

    fn schedule(&mut self, id: TaskId, class: TaskClass, task: Task, delay: Duration) {
        debug!(%id, %class, label = task.label(), ?delay, "SchedulerCore::schedule: called");
        self.stats.total_scheduled += 1;
        self.events.emit(SchedulerEvent::TaskScheduled {
            task_id: id,
            class,
            label: task.label().to_string(),
            delay_ms: delay.as_millis() as u64,
        });

        let entry = self.entries.entry(id).or_insert_with(|| Entry {
            class,
            task: task.clone(),
            timer: None,
            queued: VecDeque::new(),
        });
        entry.task = task;
        if let Some(previous) = entry.timer.take() {
            debug!(%id, seq = previous.seq, "SchedulerCore::schedule: superseding pending timer");
            previous.handle.abort();
        }

        if delay.is_zero() {
            self.admit(id);
            return;
        }

        self.timer_seq += 1;
        let seq = self.timer_seq;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SchedulerRequest::Fire { id, seq });
            }
        });
        entry.timer = Some(PendingTimer { seq, handle });
    }

    fn fire(&mut self, id: TaskId, seq: u64) {
        let Some(entry) = self.entries.get_mut(&id) else {
            debug!(%id, seq, "SchedulerCore::fire: entry gone, ignoring");
            return;
        };
        if entry.timer.as_ref().map(|timer| timer.seq) != Some(seq) {
            debug!(%id, seq, "SchedulerCore::fire: superseded timer, ignoring");
            return;
        }
        entry.timer = None;
        self.admit(id);
    }

    /// Move an entry's task into its class queue
    fn admit(&mut self, id: TaskId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let class = entry.class;
        let task = entry.task.clone();
        let label = task.label().to_string();
        let remover = self.queue.enqueue(class, QueuedTask { id, class, task });
        entry.queued.push_back(remover);

        self.stats.total_admitted += 1;
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.queue.depth());
        debug!(%id, %class, %label, depth = self.queue.depth(), "Task admitted");
        self.events.emit(SchedulerEvent::TaskAdmitted {
            task_id: id,
            class,
            label,
        });
    }

    fn cancel(&mut self, id: TaskId) {
        let Some(mut entry) = self.entries.remove(&id) else {
            debug!(%id, "SchedulerCore::cancel: nothing pending");
            return;
        };
        if let Some(timer) = entry.timer.take() {
            timer.handle.abort();
        }
        let mut was_queued = false;
        for remover in entry.queued.drain(..) {
            was_queued |= self.queue.remove(remover).is_some();
        }

        self.stats.total_cancelled += 1;
        debug!(%id, class = %entry.class, label = entry.task.label(), was_queued, "Task removed");
        self.events.emit(SchedulerEvent::TaskRemoved {
            task_id: id,
            class: entry.class,
            label: entry.task.label().to_string(),
            was_queued,
        });
    }

    /// Start a drain pass unless one is already waiting on the wake timer
    fn try_drain(&mut self) {
        if let Some(wake_at) = self.wake_at {
            debug!(?wake_at, "SchedulerCore::try_drain: wake timer pending, skipping");
            return;
        }
        self.drain();
    }

    fn drain(&mut self) {
        let tokens = self.bucket.refill(Instant::now());
        debug!(
            tokens,
            priority_queued = self.queue.priority_depth(),
            regular_queued = self.queue.regular_depth(),
            "SchedulerCore::drain: called"
        );

        let threshold = self.config.high_capacity_threshold();
        let mut empty_turns: u8 = 0;
        while self.queue.has_work() && self.bucket.has_token() {
            let allow_regular = self.bucket.tokens() >= threshold;
            match self.queue.dequeue(allow_regular) {
                Some(queued) => {
                    empty_turns = 0;
                    self.execute(queued);
                    self.bucket.try_consume();
                }
                None => {
                    // No token is spent on an empty turn; the counter still advances
                    empty_turns += 1;
                    self.stats.total_empty_turns += 1;
                    if empty_turns >= FairnessCounter::CYCLE {
                        warn!(
                            tokens = self.bucket.tokens(),
                            "No task offered for a full fairness cycle, ending drain pass"
                        );
                        break;
                    }
                }
            }
        }

        if self.queue.has_work() {
            let wait = self.bucket.time_until_next_token().max(MIN_WAKE);
            self.wake_at = Some(Instant::now() + wait);
            debug!(tokens = self.bucket.tokens(), ?wait, "Drain parked until next token");
            self.events.emit(SchedulerEvent::DrainParked {
                tokens: self.bucket.tokens(),
                wake_in_ms: wait.as_millis() as u64,
                priority_queued: self.queue.priority_depth(),
                regular_queued: self.queue.regular_depth(),
            });
        }
    }

    /// Run one dequeued task, isolating any failure
    fn execute(&mut self, queued: QueuedTask) {
        let QueuedTask { id, class, task } = queued;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.queued.pop_front();
            if entry.is_idle() {
                self.entries.remove(&id);
            }
        }

        self.stats.total_executed += 1;
        debug!(%id, %class, label = task.label(), tokens = self.bucket.tokens(), "Executing task");
        self.events.emit(SchedulerEvent::TaskStarted {
            task_id: id,
            class,
            label: task.label().to_string(),
            tokens_before: self.bucket.tokens(),
        });

        match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(TaskRun::Finished(Ok(()))) => {}
            Ok(TaskRun::Finished(Err(e))) => self.report_failure(id, class, task.label(), format!("{:#}", e)),
            Ok(TaskRun::Deferred(fut)) => self.spawn_deferred(id, class, task.label().to_string(), fut),
            Err(payload) => self.report_failure(id, class, task.label(), panic_message(payload.as_ref())),
        }
    }

    /// Drive a deferred task in the background, reporting only its failure
    fn spawn_deferred(&self, id: TaskId, class: TaskClass, label: String, fut: BoxFuture<'static, TaskResult>) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let error = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => panic_message(payload.as_ref()),
            };
            match tx.upgrade() {
                Some(tx) => {
                    let _ = tx.send(SchedulerRequest::TaskFailed { id, class, label, error });
                }
                None => warn!(%id, %label, %error, "Deferred task failed after scheduler stopped"),
            }
        });
    }

    fn report_failure(&mut self, id: TaskId, class: TaskClass, label: &str, error: String) {
        warn!(%id, %class, %label, %error, "Task failed");
        self.stats.total_failed += 1;
        self.events.emit(SchedulerEvent::TaskFailed {
            task_id: id,
            class,
            label: label.to_string(),
            error,
        });
    }

    fn queue_state(&self) -> QueueState {
        let now = Instant::now();
        QueueState {
            priority_queued: self.queue.priority_depth(),
            regular_queued: self.queue.regular_depth(),
            pending_timers: self.entries.values().filter(|e| e.timer.is_some()).count(),
            tokens: self.bucket.available(now),
            capacity: self.bucket.capacity(),
            wake_in: self.wake_at.map(|wake_at| wake_at.saturating_duration_since(now)),
            stats: self.stats.clone(),
        }
    }

    fn shutdown(&mut self) {
        let pending = self.entries.len();
        for (_, entry) in self.entries.drain() {
            if let Some(timer) = entry.timer {
                timer.handle.abort();
            }
        }
        debug!(pending, queued = self.queue.depth(), "SchedulerCore::shutdown: timers aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock};

    use crate::scheduler::TaskHandle;

    fn config(capacity: u32, refill_interval_ms: u64, initial_tokens: f64) -> SchedulerConfig {
        SchedulerConfig {
            capacity,
            refill_interval_ms,
            initial_tokens,
            ..Default::default()
        }
    }

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn recording_task(log: &Arc<Mutex<Vec<String>>>, label: &str) -> Task {
        let log = log.clone();
        let name = label.to_string();
        Task::new(label, move || {
            log.lock().unwrap().push(name.clone());
            Ok(())
        })
    }

    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_cadence_with_ample_tokens() {
        let (handle, _join) = Scheduler::spawn(config(5, 3000, 5.0)).unwrap();
        let log = recorder();

        for name in ["p1", "p2", "p3", "p4"] {
            handle.submit_priority(recording_task(&log, name), Duration::ZERO).unwrap();
        }
        handle.submit(recording_task(&log, "r1"), Duration::ZERO).unwrap();
        settle().await;

        assert_eq!(*log.lock().unwrap(), vec!["p1", "p2", "p3", "r1", "p4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_first_token() {
        let (handle, _join) = Scheduler::spawn(config(1, 1000, 0.0)).unwrap();
        let (ran_tx, mut ran_rx) = mpsc::unbounded_channel();
        let start = Instant::now();

        let task = Task::new("first", move || {
            let _ = ran_tx.send(Instant::now());
            Ok(())
        });
        handle.submit_priority(task, Duration::ZERO).unwrap();

        settle().await;
        assert!(ran_rx.try_recv().is_err(), "task must not run without a token");
        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.priority_queued, 1);
        assert!(state.is_parked());

        let ran_at = ran_rx.recv().await.unwrap();
        let waited = ran_at - start;
        assert!(waited >= Duration::from_millis(1000), "ran after {:?}", waited);
        assert!(waited < Duration::from_millis(1100), "ran after {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_failure_does_not_stop_drain() {
        let (handle, _join) = Scheduler::spawn(config(5, 3000, 5.0)).unwrap();
        let mut events = handle.subscribe();
        let log = recorder();

        handle
            .submit_priority(Task::new("fails", || Err(eyre::eyre!("boom"))), Duration::ZERO)
            .unwrap();
        handle
            .submit_priority(Task::new("panics", || panic!("kaboom")), Duration::ZERO)
            .unwrap();
        handle.submit_priority(recording_task(&log, "after"), Duration::ZERO).unwrap();
        settle().await;

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.stats.total_executed, 3);
        assert_eq!(state.stats.total_failed, 2);

        let mut failures = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SchedulerEvent::TaskFailed { label, error, .. } = event {
                failures.push((label, error));
            }
        }
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0], ("fails".to_string(), "boom".to_string()));
        assert_eq!(failures[1].0, "panics");
        assert!(failures[1].1.contains("kaboom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_failure_is_reported() {
        let (handle, _join) = Scheduler::spawn(config(5, 3000, 5.0)).unwrap();
        let mut events = handle.subscribe();

        let task = Task::deferred("remote", || async {
            sleep(Duration::from_millis(50)).await;
            Err(eyre::eyre!("rejected"))
        });
        let task_handle = handle.submit(task, Duration::ZERO).unwrap();

        let failure = loop {
            match events.recv().await.unwrap() {
                SchedulerEvent::TaskFailed { task_id, error, .. } => break (task_id, error),
                _ => continue,
            }
        };
        assert_eq!(failure, (task_handle.id(), "rejected".to_string()));
        assert_eq!(handle.queue_state().await.unwrap().stats.total_failed, 1);
    }

    async fn lose_connection() -> TaskResult {
        sleep(Duration::from_millis(50)).await;
        panic!("lost connection")
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_panic_is_reported() {
        let (handle, _join) = Scheduler::spawn(config(5, 3000, 5.0)).unwrap();
        let mut events = handle.subscribe();
        let log = recorder();

        let task_handle = handle.submit(Task::deferred("flaky", lose_connection), Duration::ZERO).unwrap();
        handle.submit(recording_task(&log, "after"), Duration::from_millis(100)).unwrap();

        let failure = loop {
            match events.recv().await.unwrap() {
                SchedulerEvent::TaskFailed { task_id, error, .. } => break (task_id, error),
                _ => continue,
            }
        };
        assert_eq!(failure, (task_handle.id(), "panicked: lost connection".to_string()));

        sleep(Duration::from_millis(200)).await;
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.stats.total_failed, 1);
        assert_eq!(state.stats.total_executed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_timer_fires() {
        let (handle, _join) = Scheduler::spawn(config(5, 100, 5.0)).unwrap();
        let log = recorder();

        let task_handle = handle.submit(recording_task(&log, "never"), Duration::from_secs(1)).unwrap();
        settle().await;
        assert_eq!(handle.queue_state().await.unwrap().pending_timers, 1);

        task_handle.cancel().unwrap();
        sleep(Duration::from_secs(3)).await;

        assert!(log.lock().unwrap().is_empty());
        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.pending_timers, 0);
        assert_eq!(state.stats.total_admitted, 0);
        assert_eq!(state.stats.total_cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_admission_before_drain() {
        let (handle, _join) = Scheduler::spawn(config(1, 1000, 0.0)).unwrap();
        let log = recorder();

        let task_handle = handle.submit(recording_task(&log, "queued"), Duration::ZERO).unwrap();
        settle().await;
        assert_eq!(handle.queue_state().await.unwrap().regular_queued, 1);

        task_handle.cancel().unwrap();
        sleep(Duration::from_secs(3)).await;

        assert!(log.lock().unwrap().is_empty());
        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.queued(), 0);
        assert_eq!(state.stats.total_executed, 0);
        assert_eq!(state.stats.total_cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_from_inside_task() {
        let (handle, _join) = Scheduler::spawn(config(5, 100, 5.0)).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let own_handle: Arc<OnceLock<TaskHandle>> = Arc::new(OnceLock::new());
        let log = recorder();

        let counter = runs.clone();
        let me = own_handle.clone();
        let task = Task::new("poll", move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0
                && let Some(me) = me.get()
            {
                me.reschedule(Duration::from_millis(500))?;
            }
            Ok(())
        });
        let task_handle = handle.prepare(TaskClass::Regular, task);
        own_handle.set(task_handle.clone()).unwrap();
        task_handle.reschedule(Duration::ZERO).unwrap();

        let other = handle.submit(recording_task(&log, "other"), Duration::from_secs(2)).unwrap();
        assert_ne!(other.id(), task_handle.id());

        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(*log.lock().unwrap(), vec!["other"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes_pending_timer() {
        let (handle, _join) = Scheduler::spawn(config(5, 100, 5.0)).unwrap();
        let log = recorder();

        let task_handle = handle
            .submit_priority(recording_task(&log, "once"), Duration::from_millis(200))
            .unwrap();
        task_handle.reschedule(Duration::from_secs(1)).unwrap();

        sleep(Duration::from_millis(500)).await;
        assert!(log.lock().unwrap().is_empty());

        sleep(Duration::from_secs(1)).await;
        assert_eq!(*log.lock().unwrap(), vec!["once"]);

        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.stats.total_scheduled, 2);
        assert_eq!(state.stats.total_admitted, 1);
        assert_eq!(state.pending_timers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_limit_throughput() {
        let (handle, _join) = Scheduler::spawn(config(2, 1000, 2.0)).unwrap();
        let log = recorder();

        for i in 0..4 {
            handle
                .submit_priority(recording_task(&log, &format!("t{}", i)), Duration::ZERO)
                .unwrap();
        }
        settle().await;
        assert_eq!(log.lock().unwrap().len(), 2);

        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.priority_queued, 2);
        assert!(state.tokens < 1.0);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(log.lock().unwrap().len(), 3);

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(*log.lock().unwrap(), vec!["t0", "t1", "t2", "t3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_progresses_through_empty_turns() {
        let (handle, _join) = Scheduler::spawn(config(10, 1000, 3.0)).unwrap();
        let log = recorder();

        for name in ["r1", "r2"] {
            handle.submit(recording_task(&log, name), Duration::ZERO).unwrap();
        }
        settle().await;

        // Three tokens is below the borrowing threshold, so each regular task
        // waits out three empty priority turns without spending a token
        assert_eq!(*log.lock().unwrap(), vec!["r1", "r2"]);
        let state = handle.queue_state().await.unwrap();
        assert_eq!(state.queued(), 0);
        assert_eq!(state.stats.total_executed, 2);
        assert_eq!(state.stats.total_empty_turns, 6);
        assert!(state.tokens >= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let (handle, join) = Scheduler::spawn(SchedulerConfig::default()).unwrap();
        handle.submit(Task::new("idle", || Ok(())), Duration::from_secs(60)).unwrap();

        handle.shutdown().unwrap();
        join.await.unwrap();

        assert!(handle.is_closed());
        assert!(matches!(handle.queue_state().await, Err(SchedulerError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_handles_dropped() {
        let (handle, join) = Scheduler::spawn(SchedulerConfig::default()).unwrap();
        drop(handle);
        join.await.unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Scheduler::new(SchedulerConfig {
            capacity: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }
}
