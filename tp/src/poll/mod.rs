//! Polling with backoff on top of the scheduler
//!
//! A poll loop is one rescheduling task: every check consumes a token like
//! any other work, and pending results re-arm the same entry after a
//! backoff delay. Progress is reported on a per-loop event stream.

mod backoff;
mod config;
mod poller;

pub use backoff::{Backoff, ExponentialBackoff};
pub use config::PollingConfig;
pub use poller::{PollEvent, PollOptions, PollStatus, PollSubscription, poll};
