//! nottif-cron: recurring notification scheduling.
//!
//! [`Scheduler`] keeps one engine registration per persisted cron job and,
//! on every tick, sends the job's message through the notifier and reports
//! the outcome through an [`EventReporter`] callback. The timer itself sits
//! behind [`ScheduleEngine`] so the scheduling logic runs without real clocks
//! in tests.

pub mod engine;
pub mod manual;
pub mod scheduler;

use thiserror::Error;

pub use engine::{
    CronSchedule, JobHandle, JobTask, ScheduleEngine, TokioCronEngine, parse_schedule,
};
pub use manual::ManualEngine;
pub use scheduler::{EventReporter, Scheduler};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("schedule engine has been shut down")]
    EngineStopped,
}
