//! Taskpacer - rate-limited, priority-aware task scheduler
//!
//! Work is submitted with a delay, admitted into a priority or regular queue
//! once the delay elapses, and executed only while a token bucket has whole
//! tokens. Priority work gets three of every four turns; regular work gets
//! the fourth, and may borrow priority turns while the bucket is near full.
//!
//! # Modules
//!
//! - [`scheduler`] - Ordered queue, dual queue, token bucket and the scheduler task
//! - [`poll`] - Polling loops with backoff built on task rescheduling
//! - [`events`] - Broadcast bus of scheduler events
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface for the `tp` binary
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use taskpacer::scheduler::{Scheduler, SchedulerConfig, Task};
//!
//! # async fn demo() -> eyre::Result<()> {
//! let (scheduler, _join) = Scheduler::spawn(SchedulerConfig::default())?;
//! let handle = scheduler.submit_priority(Task::new("ping", || Ok(())), Duration::ZERO)?;
//! handle.reschedule(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod poll;
pub mod scheduler;

pub use config::Config;
pub use error::SchedulerError;
pub use events::{EventBus, SchedulerEvent};
pub use poll::{Backoff, ExponentialBackoff, PollEvent, PollOptions, PollStatus, PollSubscription};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, Task, TaskClass, TaskHandle, TaskId};
