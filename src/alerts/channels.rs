//! Alert delivery channels.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::{Alert, ChannelError, payload};
use crate::{
    config::WebhookConfig,
    logs::{Category, LogStore},
};

const USER_AGENT: &str = concat!("logkeeper-alerts/", env!("CARGO_PKG_VERSION"));

/// A destination for rendered alerts.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver an alert, returning a channel-specific response summary.
    async fn send(&self, alert: &Alert) -> Result<Value, ChannelError>;
}

/// Posts Slack-compatible JSON to a webhook URL.
pub struct WebhookChannel {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(client: Client, config: &WebhookConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// HTTP client shared by webhook deliveries.
    pub fn build_client() -> Result<Client, reqwest::Error> {
        Client::builder().user_agent(USER_AGENT).build()
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, alert), fields(alert_type = %alert.kind))]
    async fn send(&self, alert: &Alert) -> Result<Value, ChannelError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&payload::webhook_payload(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChannelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(json!({
            "status": status.as_u16(),
            "status_text": status.canonical_reason().unwrap_or_default(),
        }))
    }
}

/// A rendered alert email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Transport for alert emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<Value, ChannelError>;
}

/// Logs the email instead of sending it.
///
/// Used when no mail transport is wired in; deliveries report failure so the
/// alert outcome reflects that nothing left the host.
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<Value, ChannelError> {
        info!(
            to = ?message.to,
            subject = %message.subject,
            "Email alert would be sent"
        );
        Err(ChannelError::NotConfigured(
            "no email transport configured".to_string(),
        ))
    }
}

pub struct EmailChannel {
    sender: Arc<dyn EmailSender>,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(sender: Arc<dyn EmailSender>, recipients: Vec<String>) -> Self {
        Self { sender, recipients }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<Value, ChannelError> {
        let message = payload::email_message(alert, &self.recipients);
        self.sender.send(&message).await
    }
}

/// Records alerts in the audit log category.
pub struct AuditChannel {
    logs: Arc<dyn LogStore>,
}

impl AuditChannel {
    pub fn new(logs: Arc<dyn LogStore>) -> Self {
        Self { logs }
    }
}

#[async_trait]
impl AlertChannel for AuditChannel {
    fn name(&self) -> &'static str {
        "internal"
    }

    async fn send(&self, alert: &Alert) -> Result<Value, ChannelError> {
        let entry = json!({
            "timestamp": alert.timestamp.to_rfc3339(),
            "level": "info",
            "event": "System Alert Generated",
            "alert_type": alert.kind.as_str(),
            "severity": alert.severity,
            "message": alert.message,
            "data": alert.data,
        });
        self.logs.write_entry(Category::Audit, &entry).await?;
        Ok(json!({"logged": true, "system": "internal_audit_log"}))
    }
}
