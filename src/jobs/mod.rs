//! Scheduled maintenance jobs.
//!
//! The scheduler owns one background task per enabled job:
//!
//! - **cleanup**: prunes expired local log files
//! - **backup**: uploads the most recent days of logs to object storage
//! - **backup_cleanup**: deletes backups past their retention period
//! - **monitoring**: runs a health check and alerts on issues
//!
//! Each task waits for its next cron fire time, runs the job body in its own
//! spawned task, and only then computes the next fire time, so a job never
//! overlaps itself. Failures (including panics) are logged and converted into
//! alerts; they never stop the scheduler.
//!
//! # Example
//!
//! ```toml
//! [cleanup]
//! schedule = "0 2 * * *"
//!
//! [backup]
//! enabled = true
//! schedule = "0 3 * * *"
//! cleanup_schedule = "0 4 * * 0"
//!
//! [monitoring]
//! schedule = "0 */6 * * *"
//! ```

mod cron;
mod scheduler;

use std::fmt;

pub use cron::CronSchedule;
pub use scheduler::{JobRunSummary, JobStatus, MaintenanceScheduler, SchedulerStatus};
use serde::Serialize;
use thiserror::Error;

use crate::{
    alerts::AlertKind, backup::BackupError, health::HealthError, retention::CleanupError,
    validation::ValidationError,
};

/// The recurring jobs owned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    Cleanup,
    Backup,
    BackupCleanup,
    Monitoring,
}

impl JobName {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::Cleanup => "cleanup",
            JobName::Backup => "backup",
            JobName::BackupCleanup => "backup_cleanup",
            JobName::Monitoring => "monitoring",
        }
    }

    /// Alert raised when a run of this job fails.
    pub fn failure_alert(&self) -> AlertKind {
        match self {
            JobName::Cleanup => AlertKind::CleanupFailed,
            JobName::Backup => AlertKind::BackupFailed,
            JobName::BackupCleanup => AlertKind::BackupCleanupFailed,
            JobName::Monitoring => AlertKind::HealthCheckFailed,
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Invalid schedule for {job} job: {source}")]
    InvalidSchedule {
        job: JobName,
        #[source]
        source: ValidationError,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Failure of a single job run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error("Backups are enabled but no backup client is configured")]
    BackupNotConfigured,

    #[error("Job panicked: {0}")]
    Panicked(String),
}
