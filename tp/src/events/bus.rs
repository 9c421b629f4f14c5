//! Broadcast bus for scheduler events
//!
//! Any number of observers (the `tp` binary, tests, a caller's own monitor)
//! can watch scheduler activity without affecting it.

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::types::SchedulerEvent;

/// Events buffered per subscriber before the slowest one starts lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Clone-shared broadcast sender for [`SchedulerEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: called");
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Publish an event
    ///
    /// With no subscribers the event is discarded; a lagging subscriber
    /// loses its oldest events.
    pub fn emit(&self, event: SchedulerEvent) {
        trace!(event_type = event.event_type(), task_id = ?event.task_id(), "EventBus::emit: called");
        if self.tx.send(event).is_err() {
            trace!("EventBus::emit: no subscribers");
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        debug!(existing = self.tx.receiver_count(), "EventBus::subscribe: called");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
