//! Configuration loading.
//!
//! Configuration comes from an optional TOML file (with `${VAR}` expansion)
//! followed by environment variable overrides, then validation. Every
//! section has defaults, so running with no file at all is valid.
//!
//! ```toml
//! [logs]
//! dir = "/var/log/app"
//!
//! [cleanup.retention]
//! application_days = 14
//!
//! [backup]
//! enabled = true
//!
//! [backup.storage.s3]
//! bucket = "${LOG_BACKUP_S3_BUCKET}"
//! region = "eu-west-1"
//! ```

mod alerts;
mod backup;
mod monitoring;
mod observability;
mod retention;
mod storage;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

pub use alerts::*;
pub use backup::*;
pub use monitoring::*;
pub use observability::*;
pub use retention::*;
use serde::{Deserialize, Serialize};
pub use storage::*;

use crate::{jobs::CronSchedule, logs::Category};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Identity of the service whose logs are maintained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Service tag used in alerts and backup object metadata.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Deployment environment reported in alerts.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: default_environment(),
        }
    }
}

fn default_service_name() -> String {
    "roastr-ai".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

/// Location of the log directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsConfig {
    /// Root directory; each category lives in a subdirectory.
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl MaintenanceConfig {
    /// Load from an optional file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::parse_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e, path.to_path_buf()))?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        Ok(toml::from_str(&expanded)?)
    }

    /// Apply the environment-style configuration surface on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(env) = env_var("APP_ENV").or_else(|| env_var("NODE_ENV")) {
            self.service.environment = env;
        }
        if let Some(dir) = env_var("LOG_DIR") {
            self.logs.dir = PathBuf::from(dir);
        }

        // Cleanup is on unless explicitly disabled
        if let Some(v) = env_var("LOG_CLEANUP_ENABLED") {
            self.cleanup.enabled = v != "false";
        }
        if let Some(v) = env_var("LOG_CLEANUP_SCHEDULE") {
            self.cleanup.schedule = v;
        }
        for (category, var) in [
            (Category::Application, "LOG_RETENTION_APPLICATION_DAYS"),
            (Category::Integration, "LOG_RETENTION_INTEGRATION_DAYS"),
            (Category::Shield, "LOG_RETENTION_SHIELD_DAYS"),
            (Category::Security, "LOG_RETENTION_SECURITY_DAYS"),
            (Category::Worker, "LOG_RETENTION_WORKER_DAYS"),
            (Category::Audit, "LOG_RETENTION_AUDIT_DAYS"),
        ] {
            if let Some(days) = env_parse::<u32>(var)? {
                self.cleanup.retention.set_days(category, days);
            }
        }

        // Backup is off unless explicitly enabled
        if let Some(v) = env_var("LOG_BACKUP_ENABLED") {
            self.backup.enabled = v == "true";
        }
        if let Some(v) = env_var("LOG_BACKUP_SCHEDULE") {
            self.backup.schedule = v;
        }
        if let Some(v) = env_var("LOG_BACKUP_CLEANUP_SCHEDULE") {
            self.backup.cleanup_schedule = v;
        }
        if let Some(days) = env_parse("LOG_BACKUP_RECENT_DAYS")? {
            self.backup.recent_days = days;
        }
        if let Some(days) = env_parse("LOG_BACKUP_RETENTION_DAYS")? {
            self.backup.retention_days = days;
        }
        if let Some(prefix) = env_var("LOG_BACKUP_S3_PREFIX") {
            self.backup.storage.key_prefix = prefix;
        }
        let bucket = env_var("LOG_BACKUP_S3_BUCKET");
        let region = env_var("AWS_REGION");
        let access_key_id = env_var("AWS_ACCESS_KEY_ID");
        let secret_access_key = env_var("AWS_SECRET_ACCESS_KEY");
        if bucket.is_some() || self.backup.storage.s3.is_some() {
            let s3 = self
                .backup
                .storage
                .s3
                .get_or_insert_with(S3StorageConfig::default);
            if let Some(bucket) = bucket {
                s3.bucket = bucket;
            }
            if region.is_some() {
                s3.region = region;
            }
            if access_key_id.is_some() {
                s3.access_key_id = access_key_id;
            }
            if secret_access_key.is_some() {
                s3.secret_access_key = secret_access_key;
            }
        }

        if let Some(v) = env_var("LOG_MONITORING_ENABLED") {
            self.monitoring.enabled = v != "false";
        }
        if let Some(v) = env_var("LOG_MONITORING_SCHEDULE") {
            self.monitoring.schedule = v;
        }
        if let Some(gb) = env_parse("LOG_ALERT_THRESHOLD_GB")? {
            self.monitoring.alert_threshold_gb = gb;
        }

        if let Some(v) = env_var("ALERTING_ENABLED") {
            self.alerts.enabled = v != "false";
        }
        if let Some(url) = env_var("LOG_ALERT_WEBHOOK_URL") {
            match &mut self.alerts.webhook {
                Some(webhook) => webhook.url = url,
                None => self.alerts.webhook = Some(WebhookConfig::new(url)),
            }
        }
        if let Some(v) = env_var("EMAIL_ALERTS_ENABLED") {
            self.alerts.email.enabled = v == "true";
        }
        if let Some(v) = env_var("ALERT_EMAIL_RECIPIENTS") {
            self.alerts.email.recipients = v
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
        if let Some(max) = env_parse("MAX_ALERTS_PER_HOUR")? {
            self.alerts.max_alerts_per_hour = max;
        }
        if let Some(minutes) = env_parse("ALERT_COOLDOWN_MINUTES")? {
            self.alerts.cooldown_minutes = minutes;
        }

        Ok(())
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cleanup
            .retention
            .validate()
            .map_err(ConfigError::Validation)?;

        let mut schedules = Vec::new();
        if self.cleanup.enabled {
            schedules.push(("cleanup.schedule", &self.cleanup.schedule));
        }
        if self.backup.enabled {
            schedules.push(("backup.schedule", &self.backup.schedule));
            schedules.push(("backup.cleanup_schedule", &self.backup.cleanup_schedule));
        }
        if self.monitoring.enabled {
            schedules.push(("monitoring.schedule", &self.monitoring.schedule));
        }
        for (field, expression) in schedules {
            CronSchedule::parse(expression)
                .map_err(|e| ConfigError::Validation(format!("{}: {}", field, e)))?;
        }

        if self.backup.enabled {
            self.backup.validate().map_err(ConfigError::Validation)?;
        }
        self.monitoring.validate().map_err(ConfigError::Validation)?;
        self.alerts.validate().map_err(ConfigError::Validation)?;

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid value for environment variable {name}: {message}")]
    InvalidEnvVar { name: String, message: String },

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                message: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid expansion pattern: {}", e)))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
