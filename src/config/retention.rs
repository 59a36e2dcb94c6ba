//! Log retention configuration.
//!
//! Configures the scheduled sweep that deletes log files older than their
//! category's retention period.
//!
//! # Example
//!
//! ```toml
//! [cleanup]
//! enabled = true
//! schedule = "0 2 * * *"
//!
//! [cleanup.retention]
//! application_days = 30
//! shield_days = 90
//! audit_days = 365
//! ```

use serde::{Deserialize, Serialize};

use crate::logs::Category;

/// Upper bound for any retention period (ten years).
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Log cleanup job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupConfig {
    /// Whether the scheduled cleanup job runs.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (UTC) for the cleanup job.
    /// Default: "0 2 * * *" (daily at 02:00)
    #[serde(default = "default_cleanup_schedule")]
    pub schedule: String,

    /// Report what would be deleted without deleting anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Retention periods per category.
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_cleanup_schedule(),
            dry_run: false,
            retention: RetentionPolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cleanup_schedule() -> String {
    "0 2 * * *".to_string()
}

/// Retention period in days for each log category.
///
/// A file is eligible for deletion once its modification time is strictly
/// before `now - days`. Zero means every file older than the current instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPolicy {
    /// Default: 30 days
    #[serde(default = "default_application_days")]
    pub application_days: u32,

    /// Default: 30 days
    #[serde(default = "default_integration_days")]
    pub integration_days: u32,

    /// Shield moderation logs. Default: 90 days
    #[serde(default = "default_shield_days")]
    pub shield_days: u32,

    /// Default: 90 days
    #[serde(default = "default_security_days")]
    pub security_days: u32,

    /// Default: 30 days
    #[serde(default = "default_worker_days")]
    pub worker_days: u32,

    /// Audit trails are commonly subject to compliance retention.
    /// Default: 365 days
    #[serde(default = "default_audit_days")]
    pub audit_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            application_days: default_application_days(),
            integration_days: default_integration_days(),
            shield_days: default_shield_days(),
            security_days: default_security_days(),
            worker_days: default_worker_days(),
            audit_days: default_audit_days(),
        }
    }
}

fn default_application_days() -> u32 {
    30
}

fn default_integration_days() -> u32 {
    30
}

fn default_shield_days() -> u32 {
    90
}

fn default_security_days() -> u32 {
    90
}

fn default_worker_days() -> u32 {
    30
}

fn default_audit_days() -> u32 {
    365
}

impl RetentionPolicy {
    pub fn days(&self, category: Category) -> u32 {
        match category {
            Category::Application => self.application_days,
            Category::Integration => self.integration_days,
            Category::Shield => self.shield_days,
            Category::Security => self.security_days,
            Category::Worker => self.worker_days,
            Category::Audit => self.audit_days,
        }
    }

    pub fn set_days(&mut self, category: Category, days: u32) {
        let slot = match category {
            Category::Application => &mut self.application_days,
            Category::Integration => &mut self.integration_days,
            Category::Shield => &mut self.shield_days,
            Category::Security => &mut self.security_days,
            Category::Worker => &mut self.worker_days,
            Category::Audit => &mut self.audit_days,
        };
        *slot = days;
    }

    /// Categories paired with their retention periods.
    pub fn entries(&self) -> impl Iterator<Item = (Category, u32)> + '_ {
        Category::ALL.into_iter().map(|c| (c, self.days(c)))
    }

    pub fn validate(&self) -> Result<(), String> {
        for (category, days) in self.entries() {
            if days > MAX_RETENTION_DAYS {
                return Err(format!(
                    "retention for '{}' is {} days; maximum is {}",
                    category, days, MAX_RETENTION_DAYS
                ));
            }
        }
        Ok(())
    }
}
