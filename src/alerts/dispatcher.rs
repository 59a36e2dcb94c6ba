use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::{
    Alert, AlertChannel, AlertError, AlertKind, AlertMetadata, AlertOptions, AlertOutcome,
    AlertStats, AuditChannel, ChannelResult, EmailChannel, EmailSender, LogEmailSender,
    RateLimitInfo, RateLimiter, Severity, SkipReason, WebhookChannel, payload,
};
use crate::{
    config::{AlertsConfig, ServiceConfig},
    logs::LogStore,
    observability::metrics,
};

/// Rate-limited fan-out of alerts to every configured channel.
///
/// The dispatcher is the only owner of alert history.
pub struct AlertDispatcher {
    enabled: bool,
    service: String,
    environment: String,
    metadata: AlertMetadata,
    limiter: RateLimiter,
    channels: Vec<Arc<dyn AlertChannel>>,
}

impl AlertDispatcher {
    pub fn new(
        config: &AlertsConfig,
        service: &ServiceConfig,
        channels: Vec<Arc<dyn AlertChannel>>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            service: service.name.clone(),
            environment: service.environment.clone(),
            metadata: AlertMetadata::current(),
            limiter: RateLimiter::new(config.max_alerts_per_hour, config.cooldown_minutes),
            channels,
        }
    }

    /// Build the channel set from configuration.
    ///
    /// Channel order: webhook (when a URL is set), email (when enabled), audit.
    /// Without an explicit sender, email goes to [`LogEmailSender`].
    pub fn from_config(
        config: &AlertsConfig,
        service: &ServiceConfig,
        logs: Arc<dyn LogStore>,
        email_sender: Option<Arc<dyn EmailSender>>,
    ) -> Result<Self, AlertError> {
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();

        if let Some(webhook) = &config.webhook {
            let client = WebhookChannel::build_client()?;
            channels.push(Arc::new(WebhookChannel::new(client, webhook)));
        }
        if config.email.enabled {
            let sender: Arc<dyn EmailSender> = match email_sender {
                Some(sender) => sender,
                None => Arc::new(LogEmailSender),
            };
            channels.push(Arc::new(EmailChannel::new(
                sender,
                config.email.recipients.clone(),
            )));
        }
        channels.push(Arc::new(AuditChannel::new(logs)));

        info!(
            enabled = config.enabled,
            channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
            max_alerts_per_hour = config.max_alerts_per_hour,
            cooldown_minutes = config.cooldown_minutes,
            "Alert dispatcher configured"
        );
        Ok(Self::new(config, service, channels))
    }

    pub async fn send_alert(
        &self,
        kind: AlertKind,
        data: Value,
        options: AlertOptions,
    ) -> AlertOutcome {
        self.send_alert_at(kind, data, options, Utc::now()).await
    }

    /// Send an alert as of `now`.
    ///
    /// Rate limiting happens before anything else. An admitted alert is
    /// recorded whether or not its channels succeed.
    pub async fn send_alert_at(
        &self,
        kind: AlertKind,
        data: Value,
        options: AlertOptions,
        now: DateTime<Utc>,
    ) -> AlertOutcome {
        if !self.enabled {
            debug!(alert_type = %kind, "Alerting is disabled, skipping alert");
            metrics::record_alert(kind.as_str(), "disabled");
            return AlertOutcome::skipped(SkipReason::AlertingDisabled, None);
        }

        if let Err(info) = self.limiter.try_acquire(kind.as_str(), now) {
            warn!(
                alert_type = %kind,
                alerts_last_hour = info.alerts_last_hour,
                in_cooldown = info.in_cooldown,
                cooldown_remaining_secs = info.cooldown_remaining_secs,
                "Alert rate limited"
            );
            metrics::record_alert(kind.as_str(), "rate_limited");
            return AlertOutcome::skipped(SkipReason::RateLimited, Some(info));
        }

        let alert = self.build_alert(kind, data, options, now);
        warn!(
            alert_type = %alert.kind,
            severity = %alert.severity,
            message = %alert.message,
            "Alert"
        );

        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let result = match channel.send(&alert).await {
                Ok(response) => ChannelResult {
                    channel: channel.name(),
                    success: true,
                    response: Some(response),
                    error: None,
                },
                Err(e) => {
                    error!(channel = channel.name(), error = %e, "Alert channel failed");
                    ChannelResult {
                        channel: channel.name(),
                        success: false,
                        response: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            metrics::record_alert_channel(result.channel, result.success);
            results.push(result);
        }

        let success_count = results.iter().filter(|r| r.success).count();
        let sent = success_count > 0;
        metrics::record_alert(alert.kind.as_str(), if sent { "sent" } else { "failed" });
        info!(
            alert_type = %alert.kind,
            success_count,
            total_channels = results.len(),
            "Alert dispatched"
        );

        AlertOutcome {
            sent,
            reason: None,
            rate_limit_info: None,
            success_count,
            total_channels: results.len(),
            results,
        }
    }

    fn build_alert(
        &self,
        kind: AlertKind,
        data: Value,
        options: AlertOptions,
        now: DateTime<Utc>,
    ) -> Alert {
        Alert {
            severity: options
                .severity
                .unwrap_or_else(|| payload::default_severity(&kind)),
            message: payload::render_message(&kind, &data),
            kind,
            service: options.service.unwrap_or_else(|| self.service.clone()),
            environment: options
                .environment
                .unwrap_or_else(|| self.environment.clone()),
            timestamp: now,
            data,
            metadata: self.metadata.clone(),
        }
    }

    pub fn rate_limit_info(&self, kind: &AlertKind) -> RateLimitInfo {
        self.limiter.info(kind.as_str(), Utc::now())
    }

    pub fn stats(&self) -> AlertStats {
        self.limiter.stats(Utc::now())
    }

    pub fn clear_history(&self) {
        self.limiter.clear();
    }

    /// Send an informational `test_alert` through every channel.
    pub async fn test_alert(&self) -> AlertOutcome {
        let data = json!({
            "test": true,
            "timestamp": Utc::now().to_rfc3339(),
            "message": format!("This is a test alert from the {} alert system", self.service),
        });
        self.send_alert(AlertKind::TestAlert, data, AlertOptions::severity(Severity::Info))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use tempfile::TempDir;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        alerts::{ChannelError, EmailMessage},
        config::{EmailConfig, WebhookConfig},
        logs::FsLogStore,
    };

    /// Channel that records every alert and optionally fails.
    struct RecordingChannel {
        name: &'static str,
        fail: bool,
        received: Mutex<Vec<Alert>>,
    }

    impl RecordingChannel {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                received: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, alert: &Alert) -> Result<Value, ChannelError> {
            self.received.lock().push(alert.clone());
            if self.fail {
                Err(ChannelError::NotConfigured("down".into()))
            } else {
                Ok(json!({"ok": true}))
            }
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn dispatcher(
        config: AlertsConfig,
        channels: Vec<Arc<dyn AlertChannel>>,
    ) -> AlertDispatcher {
        AlertDispatcher::new(&config, &ServiceConfig::default(), channels)
    }

    #[tokio::test]
    async fn test_disabled_alerting() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(
            AlertsConfig {
                enabled: false,
                ..Default::default()
            },
            vec![channel.clone()],
        );

        let outcome = d
            .send_alert(AlertKind::BackupFailed, json!({}), AlertOptions::default())
            .await;
        assert!(!outcome.sent);
        assert_eq!(outcome.reason, Some(SkipReason::AlertingDisabled));
        assert!(channel.received.lock().is_empty());
        assert_eq!(d.stats().total_alert_types, 0);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_alert() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(AlertsConfig::default(), vec![channel.clone()]);

        let first = d
            .send_alert_at(
                AlertKind::BackupFailed,
                json!({"error": "x"}),
                AlertOptions::default(),
                t0(),
            )
            .await;
        assert!(first.sent);

        let second = d
            .send_alert_at(
                AlertKind::BackupFailed,
                json!({"error": "x"}),
                AlertOptions::default(),
                t0() + Duration::minutes(5),
            )
            .await;
        assert!(!second.sent);
        assert_eq!(second.reason, Some(SkipReason::RateLimited));
        let info = second.rate_limit_info.unwrap();
        assert!(info.in_cooldown);
        assert_eq!(info.cooldown_remaining_secs, 600);
        assert_eq!(channel.received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_boundary() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(
            AlertsConfig {
                cooldown_minutes: 15,
                ..Default::default()
            },
            vec![channel.clone()],
        );
        let send = |minutes| {
            d.send_alert_at(
                AlertKind::StaleBackup,
                json!({}),
                AlertOptions::default(),
                t0() + Duration::minutes(minutes),
            )
        };

        assert!(send(0).await.sent);
        let suppressed = send(10).await;
        assert_eq!(suppressed.reason, Some(SkipReason::RateLimited));
        assert_eq!(
            suppressed.rate_limit_info.unwrap().cooldown_remaining_secs,
            300
        );
        assert!(send(16).await.sent);
        assert_eq!(channel.received.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_eleventh_alert_in_an_hour_is_suppressed() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(
            AlertsConfig {
                cooldown_minutes: 0,
                ..Default::default()
            },
            vec![channel.clone()],
        );

        for i in 0..10 {
            let outcome = d
                .send_alert_at(
                    AlertKind::StaleBackup,
                    json!({}),
                    AlertOptions::default(),
                    t0() + Duration::minutes(i),
                )
                .await;
            assert!(outcome.sent, "alert {} should be sent", i + 1);
        }
        let eleventh = d
            .send_alert_at(
                AlertKind::StaleBackup,
                json!({}),
                AlertOptions::default(),
                t0() + Duration::minutes(10),
            )
            .await;
        assert_eq!(eleventh.reason, Some(SkipReason::RateLimited));
        assert_eq!(channel.received.lock().len(), 10);
    }

    #[tokio::test]
    async fn test_partial_channel_failure_still_sent() {
        let ok = RecordingChannel::new("ok", false);
        let broken = RecordingChannel::new("broken", true);
        let d = dispatcher(AlertsConfig::default(), vec![broken.clone(), ok.clone()]);

        let outcome = d
            .send_alert(
                AlertKind::CleanupFailed,
                json!({"error": "disk"}),
                AlertOptions::default(),
            )
            .await;
        assert!(outcome.sent);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.total_channels, 2);
        assert!(!outcome.results[0].success);
        assert_eq!(outcome.results[0].channel, "broken");
        assert!(outcome.results[1].success);
        assert_eq!(broken.received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_all_channels_failing_is_still_recorded() {
        let broken = RecordingChannel::new("broken", true);
        let d = dispatcher(AlertsConfig::default(), vec![broken]);

        let outcome = d
            .send_alert(AlertKind::CleanupFailed, json!({}), AlertOptions::default())
            .await;
        assert!(!outcome.sent);
        assert!(outcome.reason.is_none());
        assert_eq!(d.rate_limit_info(&AlertKind::CleanupFailed).alerts_last_hour, 1);
    }

    #[tokio::test]
    async fn test_alert_content() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(AlertsConfig::default(), vec![channel.clone()]);

        d.send_alert(
            AlertKind::BackupFailed,
            json!({"error": "bucket gone"}),
            AlertOptions::severity(Severity::Critical),
        )
        .await;

        let received = channel.received.lock();
        let alert = &received[0];
        assert_eq!(alert.message, "Log backup failed: bucket gone");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.service, "roastr-ai");
        assert_eq!(alert.environment, "development");
        assert_eq!(alert.metadata.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_service_and_environment_overrides() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(AlertsConfig::default(), vec![channel.clone()]);

        d.send_alert(
            AlertKind::CleanupFailed,
            json!({"error": "disk"}),
            AlertOptions {
                environment: Some("staging".into()),
                ..AlertOptions::service("log-maintenance")
            },
        )
        .await;
        d.send_alert(AlertKind::StaleBackup, json!({}), AlertOptions::default())
            .await;

        let received = channel.received.lock();
        assert_eq!(received[0].service, "log-maintenance");
        assert_eq!(received[0].environment, "staging");
        let body = payload::webhook_payload(&received[0]);
        assert_eq!(body["text"], "🚨 LOG-MAINTENANCE Alert");
        assert_eq!(body["attachments"][0]["fields"][2]["value"], "staging");

        assert_eq!(received[1].service, "roastr-ai");
        assert_eq!(received[1].environment, "development");
    }

    #[tokio::test]
    async fn test_stats_clear_and_test_alert() {
        let channel = RecordingChannel::new("a", false);
        let d = dispatcher(AlertsConfig::default(), vec![channel.clone()]);

        let outcome = d.test_alert().await;
        assert!(outcome.sent);
        assert_eq!(channel.received.lock()[0].kind, AlertKind::TestAlert);
        assert_eq!(channel.received.lock()[0].severity, Severity::Info);

        let stats = d.stats();
        assert_eq!(stats.total_alert_types, 1);
        assert!(stats.per_type["test_alert"].rate_limited);

        d.clear_history();
        assert_eq!(d.stats().total_alert_types, 0);
        assert!(d.test_alert().await.sent);
    }

    struct CountingSender(AtomicUsize);

    #[async_trait]
    impl EmailSender for CountingSender {
        async fn send(&self, message: &EmailMessage) -> Result<Value, ChannelError> {
            assert!(message.subject.ends_with("Alert: health_issues"));
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"queued": true}))
        }
    }

    #[tokio::test]
    async fn test_from_config_fans_out_to_all_channels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let sender = Arc::new(CountingSender(AtomicUsize::new(0)));
        let config = AlertsConfig {
            webhook: Some(WebhookConfig::new(server.uri())),
            email: EmailConfig {
                enabled: true,
                recipients: vec!["ops@example.com".into()],
            },
            ..Default::default()
        };
        let d = AlertDispatcher::from_config(
            &config,
            &ServiceConfig::default(),
            Arc::new(FsLogStore::new(dir.path())),
            Some(sender.clone()),
        )
        .unwrap();

        let outcome = d
            .send_alert(
                AlertKind::HealthIssues,
                json!({"issues": [{"type": "size_alert"}]}),
                AlertOptions::default(),
            )
            .await;

        assert!(outcome.sent);
        assert_eq!(outcome.total_channels, 3);
        assert_eq!(outcome.success_count, 3);
        let names: Vec<_> = outcome.results.iter().map(|r| r.channel).collect();
        assert_eq!(names, vec!["webhook", "email", "internal"]);
        assert_eq!(sender.0.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("audit").exists());
    }

    #[tokio::test]
    async fn test_from_config_default_email_sender_fails() {
        let dir = TempDir::new().unwrap();
        let config = AlertsConfig {
            email: EmailConfig {
                enabled: true,
                recipients: vec!["ops@example.com".into()],
            },
            ..Default::default()
        };
        let d = AlertDispatcher::from_config(
            &config,
            &ServiceConfig::default(),
            Arc::new(FsLogStore::new(dir.path())),
            None,
        )
        .unwrap();

        let outcome = d
            .send_alert(AlertKind::StaleBackup, json!({}), AlertOptions::default())
            .await;
        assert!(outcome.sent);
        assert_eq!(outcome.total_channels, 2);
        assert_eq!(outcome.success_count, 1);
        assert!(!outcome.results[0].success);
    }
}
