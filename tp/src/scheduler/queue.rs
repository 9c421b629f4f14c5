//! Queue types for the scheduler
//!
//! [`DualQueue`] owns one [`OrderedQueue`] per task class and decides which
//! one supplies the next task using a fixed 3:1 priority:regular cadence.

use std::time::Duration;

use serde::Serialize;

use super::ordered::{NodeHandle, OrderedQueue};
use super::task::TaskClass;

/// Kind of slot handed out by the [`FairnessCounter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Priority,
    Regular,
}

/// Round-based fairness state
///
/// Within every cycle of four turns, the first three are priority turns and
/// the fourth is a regular turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FairnessCounter(u8);

impl FairnessCounter {
    /// Turns per fairness cycle
    pub const CYCLE: u8 = 4;

    /// Classify the current turn and advance
    pub fn next_turn(&mut self) -> Turn {
        let current = self.0;
        self.0 = if current == Self::CYCLE - 1 { 0 } else { current + 1 };
        if current < Self::CYCLE - 1 { Turn::Priority } else { Turn::Regular }
    }

    /// Position within the current cycle (0..CYCLE)
    pub fn position(&self) -> u8 {
        self.0
    }
}

/// Removes one specific entry from a [`DualQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRemover {
    class: TaskClass,
    node: NodeHandle,
}

impl QueueRemover {
    pub fn class(&self) -> TaskClass {
        self.class
    }
}

/// Priority and regular queues plus the fairness counter
#[derive(Debug)]
pub struct DualQueue<T> {
    priority: OrderedQueue<T>,
    regular: OrderedQueue<T>,
    fairness: FairnessCounter,
}

impl<T> Default for DualQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DualQueue<T> {
    pub fn new() -> Self {
        Self {
            priority: OrderedQueue::new(),
            regular: OrderedQueue::new(),
            fairness: FairnessCounter::default(),
        }
    }

    pub fn enqueue_priority(&mut self, value: T) -> QueueRemover {
        self.enqueue(TaskClass::Priority, value)
    }

    pub fn enqueue_regular(&mut self, value: T) -> QueueRemover {
        self.enqueue(TaskClass::Regular, value)
    }

    /// Append to the queue for `class`
    pub fn enqueue(&mut self, class: TaskClass, value: T) -> QueueRemover {
        let node = match class {
            TaskClass::Priority => self.priority.append(value),
            TaskClass::Regular => self.regular.append(value),
        };
        QueueRemover { class, node }
    }

    /// Cancel one enqueued entry
    ///
    /// Returns `None` when the entry already left the queue.
    pub fn remove(&mut self, remover: QueueRemover) -> Option<T> {
        match remover.class {
            TaskClass::Priority => self.priority.remove(remover.node),
            TaskClass::Regular => self.regular.remove(remover.node),
        }
    }

    pub fn has_priority_work(&self) -> bool {
        !self.priority.is_empty()
    }

    pub fn has_regular_work(&self) -> bool {
        !self.regular.is_empty()
    }

    pub fn has_work(&self) -> bool {
        self.has_priority_work() || self.has_regular_work()
    }

    pub fn priority_depth(&self) -> usize {
        self.priority.len()
    }

    pub fn regular_depth(&self) -> usize {
        self.regular.len()
    }

    pub fn depth(&self) -> usize {
        self.priority.len() + self.regular.len()
    }

    /// Take the next task according to the fairness cadence
    ///
    /// On a priority turn with an empty priority queue, regular work is only
    /// taken when `allow_regular_on_priority_turn` is set. `None` therefore
    /// means "nothing for this turn", not "both queues are empty".
    pub fn dequeue(&mut self, allow_regular_on_priority_turn: bool) -> Option<T> {
        match self.fairness.next_turn() {
            Turn::Priority if self.has_priority_work() => self.priority.pop_front(),
            Turn::Priority if allow_regular_on_priority_turn && self.has_regular_work() => self.regular.pop_front(),
            Turn::Regular if self.has_regular_work() => self.regular.pop_front(),
            _ => None,
        }
    }
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_scheduled: u64,
    pub total_admitted: u64,
    pub total_executed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
    pub total_empty_turns: u64,
    pub peak_queue_depth: usize,
}

/// Snapshot of scheduler state
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub priority_queued: usize,
    pub regular_queued: usize,
    pub pending_timers: usize,
    pub tokens: f64,
    pub capacity: f64,
    /// Time until the parked drain loop wakes, if it is parked
    pub wake_in: Option<Duration>,
    pub stats: SchedulerStats,
}

impl QueueState {
    pub fn queued(&self) -> usize {
        self.priority_queued + self.regular_queued
    }

    /// Whether the drain loop is waiting for tokens
    pub fn is_parked(&self) -> bool {
        self.wake_in.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_all(queue: &mut DualQueue<&'static str>, allow: bool, calls: usize) -> Vec<Option<&'static str>> {
        (0..calls).map(|_| queue.dequeue(allow)).collect()
    }

    #[test]
    fn test_fairness_counter_cycle() {
        let mut counter = FairnessCounter::default();
        let turns: Vec<_> = (0..8).map(|_| counter.next_turn()).collect();
        assert_eq!(
            turns,
            vec![
                Turn::Priority,
                Turn::Priority,
                Turn::Priority,
                Turn::Regular,
                Turn::Priority,
                Turn::Priority,
                Turn::Priority,
                Turn::Regular,
            ]
        );
        assert_eq!(counter.position(), 0);
    }

    #[test]
    fn test_three_to_one_cadence() {
        let mut queue = DualQueue::new();
        for _ in 0..12 {
            queue.enqueue_priority("p");
        }
        for _ in 0..4 {
            queue.enqueue_regular("r");
        }

        let order = drain_all(&mut queue, false, 16);
        for cycle in order.chunks(4) {
            assert_eq!(cycle, &[Some("p"), Some("p"), Some("p"), Some("r")]);
        }
        assert!(!queue.has_work());
    }

    #[test]
    fn test_empty_turn_with_regular_work() {
        let mut queue = DualQueue::new();
        queue.enqueue_regular("r1");
        queue.enqueue_regular("r2");

        // Priority turns without borrowing yield nothing even though work exists
        let order = drain_all(&mut queue, false, 4);
        assert_eq!(order, vec![None, None, None, Some("r1")]);
        assert!(queue.has_regular_work());
    }

    #[test]
    fn test_borrow_priority_turn_for_regular() {
        let mut queue = DualQueue::new();
        queue.enqueue_regular("r1");
        queue.enqueue_regular("r2");
        queue.enqueue_priority("p1");

        let order = drain_all(&mut queue, true, 3);
        assert_eq!(order, vec![Some("p1"), Some("r1"), Some("r2")]);
    }

    #[test]
    fn test_regular_turn_with_only_priority_work() {
        let mut queue = DualQueue::new();
        for _ in 0..4 {
            queue.enqueue_priority("p");
        }

        let order = drain_all(&mut queue, true, 5);
        assert_eq!(order, vec![Some("p"), Some("p"), Some("p"), None, Some("p")]);
    }

    #[test]
    fn test_remove_cancels_specific_entry() {
        let mut queue = DualQueue::new();
        queue.enqueue_priority("p1");
        let remover = queue.enqueue_priority("p2");
        queue.enqueue_priority("p3");
        let regular = queue.enqueue_regular("r1");

        assert_eq!(remover.class(), TaskClass::Priority);
        assert_eq!(queue.remove(remover), Some("p2"));
        assert_eq!(queue.remove(regular), Some("r1"));
        assert_eq!(queue.remove(regular), None);
        assert_eq!(queue.priority_depth(), 2);
        assert_eq!(queue.regular_depth(), 0);

        let order = drain_all(&mut queue, false, 2);
        assert_eq!(order, vec![Some("p1"), Some("p3")]);
    }

    #[test]
    fn test_queue_state_helpers() {
        let state = QueueState {
            priority_queued: 2,
            regular_queued: 3,
            pending_timers: 0,
            tokens: 1.5,
            capacity: 5.0,
            wake_in: Some(Duration::from_millis(1500)),
            stats: SchedulerStats::default(),
        };
        assert_eq!(state.queued(), 5);
        assert!(state.is_parked());
    }
}
