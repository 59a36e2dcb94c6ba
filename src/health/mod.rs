//! Log health monitoring.
//!
//! A health check aggregates statistics over the log directories, samples the
//! backup archive, and evaluates both against the configured thresholds.
//! Evaluation is a pure function so thresholds can be checked without I/O.

mod monitor;

use chrono::{DateTime, Utc};
pub use monitor::{HealthMonitor, evaluate};
use serde::Serialize;
use thiserror::Error;

use crate::logs::{LogStatistics, LogStoreError};

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Failed to collect log statistics: {0}")]
    Statistics(#[from] LogStoreError),
}

/// Overall health status, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Error,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Warning => "warning",
            HealthLevel::Error => "error",
        }
    }

    /// Numeric level for the health gauge.
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthLevel::Healthy => 0,
            HealthLevel::Warning => 1,
            HealthLevel::Error => 2,
        }
    }
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    SizeAlert,
    OldLogs,
    StaleBackup,
    BackupError,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::SizeAlert => "size_alert",
            IssueType::OldLogs => "old_logs",
            IssueType::StaleBackup => "stale_backup",
            IssueType::BackupError => "backup_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub message: String,
    pub severity: IssueSeverity,
}

/// Result of sampling the backup archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackupHealth {
    /// Backups are not enabled; no backup rules apply.
    Disabled,
    Listed {
        /// Last-modified time of the newest backup found, if any.
        latest: Option<DateTime<Utc>>,
        count: usize,
        total_size: u64,
    },
    Failed {
        error: String,
    },
}

/// A point-in-time health evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub status: HealthLevel,
    pub issues: Vec<Issue>,
    pub statistics: LogStatistics,
    pub backup: BackupHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}
