//! Health monitoring configuration.

use serde::{Deserialize, Serialize};

/// Health monitoring job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringConfig {
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (UTC) for the health check.
    /// Default: "0 */6 * * *" (every six hours)
    #[serde(default = "default_monitoring_schedule")]
    pub schedule: String,

    /// Total log size, in GiB, above which a `size_alert` issue is raised.
    #[serde(default = "default_alert_threshold_gb")]
    pub alert_threshold_gb: f64,

    /// Oldest-file age, in days, above which an `old_logs` issue is raised.
    #[serde(default = "default_max_log_age_days")]
    pub max_log_age_days: u32,

    /// Age of the newest backup, in hours, above which a `stale_backup` issue is raised.
    #[serde(default = "default_stale_backup_hours")]
    pub stale_backup_hours: u32,

    /// Number of backup objects sampled per health check.
    #[serde(default = "default_backup_sample_size")]
    pub backup_sample_size: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_monitoring_schedule(),
            alert_threshold_gb: default_alert_threshold_gb(),
            max_log_age_days: default_max_log_age_days(),
            stale_backup_hours: default_stale_backup_hours(),
            backup_sample_size: default_backup_sample_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_monitoring_schedule() -> String {
    "0 */6 * * *".to_string()
}

fn default_alert_threshold_gb() -> f64 {
    5.0
}

fn default_max_log_age_days() -> u32 {
    365
}

fn default_stale_backup_hours() -> u32 {
    48
}

fn default_backup_sample_size() -> u32 {
    10
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.alert_threshold_gb.is_finite() || self.alert_threshold_gb <= 0.0 {
            return Err("monitoring.alert_threshold_gb must be a positive number".to_string());
        }
        if self.backup_sample_size == 0 {
            return Err("monitoring.backup_sample_size must be at least 1".to_string());
        }
        Ok(())
    }
}
