//! Rate-limited, priority-aware task scheduler
//!
//! Submitted tasks wait out their delay, join a priority or regular queue,
//! and are drained while the token bucket has whole tokens. Three of every
//! four drain turns go to priority work; the fourth goes to regular work.
//! When the bucket is near full, regular work may also borrow priority turns.
//!
//! ```text
//! submit(task, delay) ──timer──▶ DualQueue ──dequeue(turn)──▶ execute
//!                                    ▲                          │
//!                         TokenBucket ── one token per task ────┘
//! ```

mod bucket;
mod config;
mod core;
mod handle;
mod messages;
mod ordered;
mod queue;
mod task;

pub use bucket::TokenBucket;
pub use config::SchedulerConfig;
pub use self::core::Scheduler;
pub use handle::{SchedulerHandle, TaskHandle};
pub use ordered::{NodeHandle, OrderedQueue};
pub use queue::{DualQueue, FairnessCounter, QueueRemover, QueueState, SchedulerStats, Turn};
pub use task::{Task, TaskClass, TaskId, TaskResult, TaskRun};
pub(crate) use task::panic_message;
