//! Backup job and retry configuration.
//!
//! # Example
//!
//! ```toml
//! [backup]
//! enabled = true
//! schedule = "0 3 * * *"
//! cleanup_schedule = "0 4 * * 0"
//! recent_days = 7
//! retention_days = 90
//!
//! [backup.retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{StorageConfig, retention::MAX_RETENTION_DAYS};

/// Backup jobs configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Whether the backup and backup-cleanup jobs run.
    /// Default: false (requires object storage to be configured)
    #[serde(default)]
    pub enabled: bool,

    /// Cron expression (UTC) for uploading recent logs.
    /// Default: "0 3 * * *" (daily at 03:00)
    #[serde(default = "default_backup_schedule")]
    pub schedule: String,

    /// Cron expression (UTC) for deleting expired backups.
    /// Default: "0 4 * * 0" (Sundays at 04:00)
    #[serde(default = "default_cleanup_schedule")]
    pub cleanup_schedule: String,

    /// Number of days, ending today, uploaded by each backup run.
    #[serde(default = "default_recent_days")]
    pub recent_days: u32,

    /// Backups older than this are deleted by the backup-cleanup job.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Alert when the share of failed days in a run exceeds this percentage.
    #[serde(default = "default_high_error_rate_percent")]
    pub high_error_rate_percent: f64,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: default_backup_schedule(),
            cleanup_schedule: default_cleanup_schedule(),
            recent_days: default_recent_days(),
            retention_days: default_retention_days(),
            high_error_rate_percent: default_high_error_rate_percent(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_backup_schedule() -> String {
    "0 3 * * *".to_string()
}

fn default_cleanup_schedule() -> String {
    "0 4 * * 0".to_string()
}

fn default_recent_days() -> u32 {
    7
}

fn default_retention_days() -> u32 {
    90
}

fn default_high_error_rate_percent() -> f64 {
    20.0
}

impl BackupConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.recent_days == 0 {
            return Err("backup.recent_days must be at least 1".to_string());
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(format!(
                "backup.retention_days is {}; maximum is {}",
                self.retention_days, MAX_RETENTION_DAYS
            ));
        }
        if !(0.0..=100.0).contains(&self.high_error_rate_percent) {
            return Err("backup.high_error_rate_percent must be between 0 and 100".to_string());
        }
        self.storage.validate()?;
        self.retry.validate()
    }
}

/// Retry configuration for object storage calls.
///
/// Only transient failures (timeouts, connection resets, throttling, 5xx) are retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay between attempts in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter added on top of each delay (fraction, 0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl RetryConfig {
    /// Delay after the `failed_attempt`-th failure (1-indexed), before the next attempt.
    ///
    /// `min(base * multiplier^(n-1), max)` plus up to `jitter` of that value.
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1) as i32;
        let base_delay = (self.base_delay_ms as f64) * self.backoff_multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_ms = if self.jitter > 0.0 && capped_delay > 0.0 {
            rand::thread_rng().gen_range(0.0..=capped_delay * self.jitter)
        } else {
            0.0
        };

        Duration::from_millis((capped_delay + jitter_ms).max(0.0) as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            return Err("retry.backoff_multiplier must be at least 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("retry.jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}
