//! Alert dispatching.
//!
//! Alerts are rate limited per type, rendered once, and fanned out to every
//! configured channel:
//!
//! - **webhook**: Slack-compatible JSON POST (when a URL is configured)
//! - **email**: handed to an [`EmailSender`] (when enabled)
//! - **audit**: a `System Alert Generated` entry in the audit log (always)
//!
//! Channels are independent; one failing never prevents the others.

mod channels;
mod dispatcher;
mod payload;
mod rate_limit;

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
pub use channels::{
    AlertChannel, AuditChannel, EmailChannel, EmailMessage, EmailSender, LogEmailSender,
    WebhookChannel,
};
pub use dispatcher::AlertDispatcher;
pub use payload::{default_severity, render_message, webhook_payload};
pub use rate_limit::{AlertRecord, AlertStats, AlertTypeStats, RateLimitInfo, RateLimiter};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Alert types with dedicated templates. Anything else is [`AlertKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKind {
    BackupFailed,
    BackupHighErrorRate,
    BackupCleanupFailed,
    CleanupFailed,
    HealthIssues,
    HealthCheckFailed,
    SizeThresholdExceeded,
    StaleBackup,
    DiskSpaceCritical,
    LogRotationFailed,
    S3ConnectionFailed,
    MaintenanceServiceDown,
    TestAlert,
    Other(String),
}

impl AlertKind {
    const KNOWN: [AlertKind; 13] = [
        AlertKind::BackupFailed,
        AlertKind::BackupHighErrorRate,
        AlertKind::BackupCleanupFailed,
        AlertKind::CleanupFailed,
        AlertKind::HealthIssues,
        AlertKind::HealthCheckFailed,
        AlertKind::SizeThresholdExceeded,
        AlertKind::StaleBackup,
        AlertKind::DiskSpaceCritical,
        AlertKind::LogRotationFailed,
        AlertKind::S3ConnectionFailed,
        AlertKind::MaintenanceServiceDown,
        AlertKind::TestAlert,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            AlertKind::BackupFailed => "backup_failed",
            AlertKind::BackupHighErrorRate => "backup_high_error_rate",
            AlertKind::BackupCleanupFailed => "backup_cleanup_failed",
            AlertKind::CleanupFailed => "cleanup_failed",
            AlertKind::HealthIssues => "health_issues",
            AlertKind::HealthCheckFailed => "health_check_failed",
            AlertKind::SizeThresholdExceeded => "size_threshold_exceeded",
            AlertKind::StaleBackup => "stale_backup",
            AlertKind::DiskSpaceCritical => "disk_space_critical",
            AlertKind::LogRotationFailed => "log_rotation_failed",
            AlertKind::S3ConnectionFailed => "s3_connection_failed",
            AlertKind::MaintenanceServiceDown => "maintenance_service_down",
            AlertKind::TestAlert => "test_alert",
            AlertKind::Other(name) => name,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AlertKind::KNOWN
            .into_iter()
            .find(|k| k.as_str() == s)
            .unwrap_or_else(|| AlertKind::Other(s.to_string())))
    }
}

impl From<&str> for AlertKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl Serialize for AlertKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Attachment colour used by the webhook and email templates.
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Critical => "#dc3545",
            Severity::Warning => "#ffc107",
            Severity::Info => "#17a2b8",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host and process details attached to every alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMetadata {
    pub hostname: String,
    pub pid: u32,
    pub platform: &'static str,
    pub version: &'static str,
}

impl AlertMetadata {
    pub fn current() -> Self {
        Self {
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            platform: std::env::consts::OS,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// A fully rendered alert, as delivered to channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub service: String,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub data: serde_json::Value,
    pub metadata: AlertMetadata,
}

/// Per-call overrides for [`AlertDispatcher::send_alert`].
///
/// `service` and `environment` fall back to the dispatcher's configured values.
#[derive(Debug, Clone, Default)]
pub struct AlertOptions {
    pub severity: Option<Severity>,
    pub service: Option<String>,
    pub environment: Option<String>,
}

impl AlertOptions {
    pub fn severity(severity: Severity) -> Self {
        Self {
            severity: Some(severity),
            ..Default::default()
        }
    }

    /// Options tagging the alert with `service` instead of the configured name.
    pub fn service(service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            ..Default::default()
        }
    }
}

/// Why an alert was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlertingDisabled,
    RateLimited,
}

/// Outcome of delivering an alert to one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelResult {
    pub channel: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of [`AlertDispatcher::send_alert`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertOutcome {
    /// True when at least one channel succeeded.
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_info: Option<RateLimitInfo>,
    pub success_count: usize,
    pub total_channels: usize,
    pub results: Vec<ChannelResult>,
}

impl AlertOutcome {
    fn skipped(reason: SkipReason, rate_limit_info: Option<RateLimitInfo>) -> Self {
        Self {
            sent: false,
            reason: Some(reason),
            rate_limit_info,
            success_count: 0,
            total_channels: 0,
            results: Vec::new(),
        }
    }
}

/// Delivery failure of a single channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Audit log write failed: {0}")]
    Audit(#[from] crate::logs::LogStoreError),
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
