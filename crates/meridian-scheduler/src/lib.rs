//! Meridian Scheduler — the Autonomous Scheduler (spec §4.H2): cron, `every`,
//! and one-shot `at` jobs that inject system events or full agent turns back
//! into sessions on a timer, independent of any inbound channel message.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod next_run;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use next_run::next_fire_after;
pub use scheduler::Scheduler;
