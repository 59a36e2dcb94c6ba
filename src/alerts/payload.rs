//! Alert rendering: message templates, default severities and channel payloads.

use serde_json::{Value, json};

use super::{Alert, AlertKind, EmailMessage, Severity};

pub fn default_severity(kind: &AlertKind) -> Severity {
    match kind {
        AlertKind::DiskSpaceCritical | AlertKind::MaintenanceServiceDown => Severity::Critical,
        AlertKind::BackupFailed | AlertKind::CleanupFailed | AlertKind::StaleBackup => {
            Severity::Warning
        }
        _ => Severity::Info,
    }
}

/// Render a field of the alert data for a template.
fn field(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}

fn error_field(data: &Value) -> String {
    match data.get("error") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => "Unknown error".to_string(),
    }
}

/// Human-readable message for an alert type.
pub fn render_message(kind: &AlertKind, data: &Value) -> String {
    match kind {
        AlertKind::BackupFailed => format!("Log backup failed: {}", error_field(data)),
        AlertKind::BackupHighErrorRate => {
            let dates = data
                .get("error_dates")
                .and_then(Value::as_array)
                .map(|dates| {
                    dates
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            format!(
                "Log backup has high error rate: {} ({})",
                field(data, "error_rate"),
                dates
            )
        }
        AlertKind::BackupCleanupFailed => format!("Backup cleanup failed: {}", error_field(data)),
        AlertKind::CleanupFailed => format!("Log cleanup failed: {}", error_field(data)),
        AlertKind::HealthIssues => format!(
            "Log system health issues detected: {} issues found",
            data.get("issues")
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        ),
        AlertKind::HealthCheckFailed => format!("Log health check failed: {}", error_field(data)),
        AlertKind::SizeThresholdExceeded => format!(
            "Log directory size exceeded threshold: {} > {}",
            field(data, "current_size"),
            field(data, "threshold")
        ),
        AlertKind::StaleBackup => format!(
            "Backup hasn't run recently: last backup was {} hours ago",
            field(data, "hours_since_last_backup")
        ),
        AlertKind::DiskSpaceCritical => format!(
            "Critical disk space: {} remaining on {}",
            field(data, "free_space"),
            field(data, "disk")
        ),
        AlertKind::LogRotationFailed => format!(
            "Log rotation failed for {}: {}",
            field(data, "log_type"),
            error_field(data)
        ),
        AlertKind::S3ConnectionFailed => format!("S3 connection failed: {}", error_field(data)),
        AlertKind::MaintenanceServiceDown => {
            format!("Log maintenance service is down: {}", error_field(data))
        }
        AlertKind::TestAlert => format!("Test alert: {}", field(data, "message")),
        AlertKind::Other(name) => format!("Alert: {} - {}", name, data),
    }
}

fn has_details(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn display_timestamp(alert: &Alert) -> String {
    alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Slack-compatible webhook body.
pub fn webhook_payload(alert: &Alert) -> Value {
    let mut fields = vec![
        json!({"title": "Type", "value": alert.kind.as_str(), "short": true}),
        json!({"title": "Severity", "value": alert.severity.as_str().to_uppercase(), "short": true}),
        json!({"title": "Environment", "value": alert.environment, "short": true}),
        json!({"title": "Timestamp", "value": display_timestamp(alert), "short": true}),
    ];
    if has_details(&alert.data) {
        let pretty = serde_json::to_string_pretty(&alert.data).unwrap_or_default();
        fields.push(json!({
            "title": "Details",
            "value": format!("```{}```", pretty),
            "short": false,
        }));
    }

    json!({
        "text": format!("🚨 {} Alert", alert.service.to_uppercase()),
        "attachments": [{
            "color": alert.severity.color(),
            "title": alert.message,
            "fields": fields,
            "footer": format!("{} | PID {}", alert.metadata.hostname, alert.metadata.pid),
            "ts": alert.timestamp.timestamp(),
        }],
    })
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Email subject and HTML body mirroring the webhook content.
pub fn email_message(alert: &Alert, recipients: &[String]) -> EmailMessage {
    let color = alert.severity.color();
    let service = escape_html(&alert.service.to_uppercase());

    let details = if has_details(&alert.data) {
        let pretty = serde_json::to_string_pretty(&alert.data).unwrap_or_default();
        format!(
            "<div class=\"details\"><h4>Details:</h4><pre>{}</pre></div>\n",
            escape_html(&pretty)
        )
    } else {
        String::new()
    };

    let html = format!(
        "<!DOCTYPE html>
<html>
<head>
<style>
body {{ font-family: Arial, sans-serif; margin: 20px; }}
.alert {{ border-left: 4px solid {color}; padding: 10px; margin: 10px 0; }}
.severity {{ color: {color}; font-weight: bold; }}
.details {{ background: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; }}
.metadata {{ font-size: 12px; color: #666; margin-top: 20px; }}
</style>
</head>
<body>
<h2>🚨 {service} Alert</h2>
<div class=\"alert\">
<h3>{message}</h3>
<p><strong>Type:</strong> {kind}</p>
<p><strong>Severity:</strong> <span class=\"severity\">{severity}</span></p>
<p><strong>Environment:</strong> {environment}</p>
<p><strong>Timestamp:</strong> {timestamp}</p>
</div>
{details}<div class=\"metadata\">
<p><strong>System:</strong> {hostname} (PID {pid})</p>
<p><strong>Platform:</strong> {platform}</p>
<p><strong>Version:</strong> {version}</p>
</div>
</body>
</html>
",
        message = escape_html(&alert.message),
        kind = escape_html(alert.kind.as_str()),
        severity = alert.severity.as_str().to_uppercase(),
        environment = escape_html(&alert.environment),
        timestamp = display_timestamp(alert),
        hostname = escape_html(&alert.metadata.hostname),
        pid = alert.metadata.pid,
        platform = alert.metadata.platform,
        version = alert.metadata.version,
    );

    EmailMessage {
        to: recipients.to_vec(),
        subject: format!("🚨 {} Alert: {}", alert.service.to_uppercase(), alert.kind),
        html,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::alerts::AlertMetadata;

    fn alert(kind: AlertKind, data: Value) -> Alert {
        Alert {
            severity: default_severity(&kind),
            message: render_message(&kind, &data),
            kind,
            service: "roastr-ai".into(),
            environment: "production".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap(),
            data,
            metadata: AlertMetadata {
                hostname: "worker-1".into(),
                pid: 4242,
                platform: "linux",
                version: "0.1.0",
            },
        }
    }

    #[test]
    fn test_default_severities() {
        assert_eq!(default_severity(&AlertKind::DiskSpaceCritical), Severity::Critical);
        assert_eq!(
            default_severity(&AlertKind::MaintenanceServiceDown),
            Severity::Critical
        );
        assert_eq!(default_severity(&AlertKind::BackupFailed), Severity::Warning);
        assert_eq!(default_severity(&AlertKind::CleanupFailed), Severity::Warning);
        assert_eq!(default_severity(&AlertKind::StaleBackup), Severity::Warning);
        assert_eq!(default_severity(&AlertKind::HealthIssues), Severity::Info);
        assert_eq!(default_severity(&AlertKind::Other("x".into())), Severity::Info);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            render_message(&AlertKind::BackupFailed, &json!({"error": "bucket gone"})),
            "Log backup failed: bucket gone"
        );
        assert_eq!(
            render_message(&AlertKind::CleanupFailed, &json!({})),
            "Log cleanup failed: Unknown error"
        );
        assert_eq!(
            render_message(
                &AlertKind::BackupHighErrorRate,
                &json!({"error_rate": "28.6%", "error_dates": ["2024-01-14", "2024-01-15"]})
            ),
            "Log backup has high error rate: 28.6% (2024-01-14, 2024-01-15)"
        );
        assert_eq!(
            render_message(&AlertKind::HealthIssues, &json!({"issues": [{}, {}]})),
            "Log system health issues detected: 2 issues found"
        );
        assert_eq!(
            render_message(&AlertKind::StaleBackup, &json!({"hours_since_last_backup": 72})),
            "Backup hasn't run recently: last backup was 72 hours ago"
        );
        assert_eq!(
            render_message(&AlertKind::Other("custom".into()), &json!({"a": 1})),
            r#"Alert: custom - {"a":1}"#
        );
    }

    #[test]
    fn test_webhook_payload_shape() {
        let alert = alert(AlertKind::BackupFailed, json!({"error": "timeout"}));
        let payload = webhook_payload(&alert);

        assert_eq!(payload["text"], "🚨 ROASTR-AI Alert");
        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], "#ffc107");
        assert_eq!(attachment["title"], "Log backup failed: timeout");
        assert_eq!(attachment["footer"], "worker-1 | PID 4242");
        assert_eq!(attachment["ts"], 1_705_287_600);

        let fields = attachment["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0]["value"], "backup_failed");
        assert_eq!(fields[1]["value"], "WARNING");
        assert_eq!(fields[2]["value"], "production");
        assert_eq!(fields[4]["title"], "Details");
        assert_eq!(fields[4]["short"], false);
        assert!(fields[4]["value"].as_str().unwrap().starts_with("```{"));
    }

    #[test]
    fn test_webhook_payload_without_details() {
        let alert = alert(AlertKind::HealthIssues, json!({}));
        let payload = webhook_payload(&alert);
        assert_eq!(payload["attachments"][0]["fields"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_email_message() {
        let alert = alert(AlertKind::DiskSpaceCritical, json!({"disk": "/var", "free_space": "<1GB"}));
        let message = email_message(&alert, &["ops@example.com".to_string()]);

        assert_eq!(message.to, vec!["ops@example.com"]);
        assert_eq!(message.subject, "🚨 ROASTR-AI Alert: disk_space_critical");
        assert!(message.html.contains("#dc3545"));
        assert!(message.html.contains("CRITICAL"));
        assert!(message.html.contains("&lt;1GB"));
        assert!(message.html.contains("worker-1 (PID 4242)"));
    }
}
