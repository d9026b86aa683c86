//! Scheduled duties of the session manager.

mod calendar;
mod service;

pub use calendar::{Calendar, missed};
pub use service::{Scheduler, SchedulerHandle};
