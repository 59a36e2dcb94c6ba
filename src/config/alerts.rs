//! Alerting configuration.
//!
//! # Example
//!
//! ```toml
//! [alerts]
//! max_alerts_per_hour = 10
//! cooldown_minutes = 15
//!
//! [alerts.webhook]
//! url = "${LOG_ALERT_WEBHOOK_URL}"
//!
//! [alerts.email]
//! enabled = true
//! recipients = ["ops@example.com"]
//! ```

use serde::{Deserialize, Serialize};

/// Alert dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertsConfig {
    /// Global switch. When false, alerts are dropped without side effects.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum alerts of one type in any trailing 60-minute window.
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,

    /// Minimum minutes between two alerts of the same type.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,

    /// Webhook channel (Slack-compatible). Disabled when absent.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    #[serde(default)]
    pub email: EmailConfig,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_alerts_per_hour: default_max_alerts_per_hour(),
            cooldown_minutes: default_cooldown_minutes(),
            webhook: None,
            email: EmailConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_alerts_per_hour() -> u32 {
    10
}

fn default_cooldown_minutes() -> u32 {
    15
}

impl AlertsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_alerts_per_hour == 0 {
            return Err("alerts.max_alerts_per_hour must be at least 1".to_string());
        }
        if let Some(webhook) = &self.webhook {
            webhook.validate()?;
        }
        if self.email.enabled && self.email.recipients.is_empty() {
            return Err("alerts.email is enabled but has no recipients".to_string());
        }
        Ok(())
    }
}

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_webhook_timeout_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| format!("alerts.webhook.url is not a valid URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err("alerts.webhook.url must use http or https".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("alerts.webhook.timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    /// Default: false
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_recipients")]
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipients: default_recipients(),
        }
    }
}

fn default_recipients() -> Vec<String> {
    vec!["admin@example.com".to_string()]
}
