//! Event bus for scheduler observability
//!
//! Every admission, execution, removal, failure and parked drain pass is
//! emitted on a broadcast channel in addition to being traced. Events are
//! purely observational; nothing in the scheduler reads them back.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (handle, _join) = Scheduler::spawn(SchedulerConfig::default())?;
//! let mut rx = handle.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {:?}", event.event_type(), event.task_id());
//! }
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use types::{EventLogEntry, SchedulerEvent};
