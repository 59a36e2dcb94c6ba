use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{BackupHealth, HealthError, HealthLevel, HealthReport, Issue, IssueSeverity, IssueType};
use crate::{
    backup::{BackupClient, BackupObject, ListOptions, format_size},
    config::MonitoringConfig,
    logs::{LogStatistics, LogStore},
    observability::metrics,
};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Runs health checks over the log directories and backup archive.
pub struct HealthMonitor {
    logs: Arc<dyn LogStore>,
    /// Present only when backups are enabled.
    backup: Option<Arc<BackupClient>>,
    config: MonitoringConfig,
}

impl HealthMonitor {
    pub fn new(
        logs: Arc<dyn LogStore>,
        backup: Option<Arc<BackupClient>>,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            logs,
            backup,
            config,
        }
    }

    pub async fn collect_statistics(&self) -> Result<LogStatistics, HealthError> {
        Ok(self.logs.statistics().await?)
    }

    /// Collect statistics, sample backups and evaluate.
    #[tracing::instrument(name = "health.check", skip(self))]
    pub async fn check(&self) -> Result<HealthReport, HealthError> {
        let statistics = self.collect_statistics().await?;
        let backup = self.backup_health().await;
        let report = evaluate(statistics, backup, &self.config, Utc::now());

        metrics::record_health_status(report.status.as_gauge(), report.statistics.total_size);
        if report.issues.is_empty() {
            info!(
                total_files = report.statistics.total_files,
                total_size = %format_size(report.statistics.total_size),
                "Log health check passed"
            );
        } else {
            warn!(
                status = %report.status,
                issues = report.issues.len(),
                "Log health check found issues"
            );
        }
        Ok(report)
    }

    /// Find the newest backup.
    ///
    /// Recent date prefixes are probed first, newest day first; only if none of
    /// them hold a backup is a sample of the whole archive listed.
    async fn backup_health(&self) -> BackupHealth {
        let Some(client) = &self.backup else {
            return BackupHealth::Disabled;
        };

        let today = Utc::now().date_naive();
        let lookback_days = i64::from(self.config.stale_backup_hours.div_ceil(24)) + 1;
        for offset in 0..=lookback_days {
            let date = today - Duration::days(offset);
            let options = ListOptions {
                date: Some(date),
                max_keys: self.config.backup_sample_size,
                ..Default::default()
            };
            match client.list_backups(&options).await {
                Ok(listing) if !listing.backups.is_empty() => {
                    debug!(date = %date, count = listing.backups.len(), "Found recent backups");
                    return listed(&listing.backups);
                }
                Ok(_) => {}
                Err(e) => {
                    return BackupHealth::Failed {
                        error: e.to_string(),
                    };
                }
            }
        }

        let options = ListOptions {
            max_keys: self.config.backup_sample_size,
            ..Default::default()
        };
        match client.list_backups(&options).await {
            Ok(listing) => listed(&listing.backups),
            Err(e) => BackupHealth::Failed {
                error: e.to_string(),
            },
        }
    }
}

fn listed(backups: &[BackupObject]) -> BackupHealth {
    BackupHealth::Listed {
        latest: backups.iter().filter_map(|b| b.last_modified).max(),
        count: backups.len(),
        total_size: backups.iter().map(|b| b.size_bytes).sum(),
    }
}

/// Apply the threshold rules to collected statistics.
///
/// Rules are independent: every triggered rule adds one issue. The status is
/// `error` if any issue has error severity, `warning` if there are any other
/// issues, and `healthy` otherwise.
pub fn evaluate(
    statistics: LogStatistics,
    backup: BackupHealth,
    config: &MonitoringConfig,
    now: DateTime<Utc>,
) -> HealthReport {
    let mut issues = Vec::new();

    let threshold_bytes = config.alert_threshold_gb * BYTES_PER_GB;
    if statistics.total_size as f64 > threshold_bytes {
        issues.push(Issue {
            issue_type: IssueType::SizeAlert,
            message: format!(
                "Total log size {} exceeds threshold of {} GB",
                format_size(statistics.total_size),
                config.alert_threshold_gb
            ),
            severity: IssueSeverity::Warning,
        });
    }

    if let Some(oldest) = &statistics.oldest_file {
        let age = now - oldest.modified_at;
        if age > Duration::days(i64::from(config.max_log_age_days)) {
            issues.push(Issue {
                issue_type: IssueType::OldLogs,
                message: format!(
                    "Oldest log file {} is {} days old (limit {} days)",
                    oldest.relative_path,
                    age.num_days(),
                    config.max_log_age_days
                ),
                severity: IssueSeverity::Warning,
            });
        }
    }

    match &backup {
        BackupHealth::Disabled => {}
        BackupHealth::Listed { latest, .. } => {
            if let Some(latest) = latest {
                let age = now - *latest;
                if age > Duration::hours(i64::from(config.stale_backup_hours)) {
                    issues.push(Issue {
                        issue_type: IssueType::StaleBackup,
                        message: format!(
                            "Most recent backup is {} hours old (limit {} hours)",
                            age.num_hours(),
                            config.stale_backup_hours
                        ),
                        severity: IssueSeverity::Warning,
                    });
                }
            }
        }
        BackupHealth::Failed { error } => {
            issues.push(Issue {
                issue_type: IssueType::BackupError,
                message: format!("Failed to list backups: {}", error),
                severity: IssueSeverity::Error,
            });
        }
    }

    let status = if issues.iter().any(|i| i.severity == IssueSeverity::Error) {
        HealthLevel::Error
    } else if issues.is_empty() {
        HealthLevel::Healthy
    } else {
        HealthLevel::Warning
    };

    HealthReport {
        timestamp: now,
        status,
        issues,
        statistics,
        backup,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::{
            BackupConfig, FilesystemStorageConfig, RetryConfig, StorageBackend, StorageConfig,
        },
        logs::{Category, FileRef, FsLogStore},
        storage::FilesystemObjectStore,
    };

    fn stats_with(total_size: u64, oldest_age_days: i64, now: DateTime<Utc>) -> LogStatistics {
        LogStatistics {
            per_category: BTreeMap::new(),
            total_files: 1,
            total_size,
            oldest_file: Some(FileRef {
                relative_path: "application/app.log".into(),
                modified_at: now - Duration::days(oldest_age_days),
            }),
            newest_file: None,
        }
    }

    #[test]
    fn test_size_threshold_exceeded() {
        let now = Utc::now();
        let total = (6.2 * BYTES_PER_GB) as u64;
        let report = evaluate(
            stats_with(total, 1, now),
            BackupHealth::Disabled,
            &MonitoringConfig::default(),
            now,
        );

        assert_eq!(report.status, HealthLevel::Warning);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].issue_type, IssueType::SizeAlert);
        assert_eq!(report.issues[0].severity, IssueSeverity::Warning);
        assert!(report.issues[0].message.contains("6.2 GB"));
    }

    #[test]
    fn test_healthy_under_thresholds() {
        let now = Utc::now();
        let report = evaluate(
            stats_with(1024, 10, now),
            BackupHealth::Listed {
                latest: Some(now - Duration::hours(3)),
                count: 4,
                total_size: 100,
            },
            &MonitoringConfig::default(),
            now,
        );
        assert_eq!(report.status, HealthLevel::Healthy);
        assert!(report.is_healthy());
    }

    #[test]
    fn test_old_logs_issue() {
        let now = Utc::now();
        let report = evaluate(
            stats_with(10, 400, now),
            BackupHealth::Disabled,
            &MonitoringConfig::default(),
            now,
        );
        assert_eq!(report.issues[0].issue_type, IssueType::OldLogs);
        assert_eq!(report.status, HealthLevel::Warning);
    }

    #[test]
    fn test_stale_backup_issue() {
        let now = Utc::now();
        let report = evaluate(
            stats_with(10, 1, now),
            BackupHealth::Listed {
                latest: Some(now - Duration::hours(49)),
                count: 1,
                total_size: 10,
            },
            &MonitoringConfig::default(),
            now,
        );
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].issue_type, IssueType::StaleBackup);
    }

    #[test]
    fn test_empty_archive_is_not_stale() {
        let now = Utc::now();
        let report = evaluate(
            stats_with(10, 1, now),
            BackupHealth::Listed {
                latest: None,
                count: 0,
                total_size: 0,
            },
            &MonitoringConfig::default(),
            now,
        );
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_backup_error_dominates_status() {
        let now = Utc::now();
        let total = (6.2 * BYTES_PER_GB) as u64;
        let report = evaluate(
            stats_with(total, 1, now),
            BackupHealth::Failed {
                error: "access denied".into(),
            },
            &MonitoringConfig::default(),
            now,
        );
        assert_eq!(report.status, HealthLevel::Error);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.issues[1].issue_type, IssueType::BackupError);
        assert_eq!(report.issues[1].severity, IssueSeverity::Error);
    }

    #[test]
    fn test_issue_serialization() {
        let issue = Issue {
            issue_type: IssueType::StaleBackup,
            message: "m".into(),
            severity: IssueSeverity::Warning,
        };
        assert_eq!(
            serde_json::to_value(&issue).unwrap(),
            serde_json::json!({"type": "stale_backup", "message": "m", "severity": "warning"})
        );
    }

    #[tokio::test]
    async fn test_check_with_backups() {
        let dir = TempDir::new().unwrap();
        let logs_dir = dir.path().join("logs");
        let app_dir = logs_dir.join(Category::Application.dir_name());
        std::fs::create_dir_all(&app_dir).unwrap();
        let log = app_dir.join("app.log");
        std::fs::write(&log, "0123456789").unwrap();

        let archive = dir.path().join("archive").to_string_lossy().into_owned();
        let store = Arc::new(
            FilesystemObjectStore::new(FilesystemStorageConfig::new(archive.clone())).unwrap(),
        );
        let logs = Arc::new(FsLogStore::new(&logs_dir));
        let config = BackupConfig {
            enabled: true,
            storage: StorageConfig {
                backend: StorageBackend::Filesystem,
                filesystem: Some(FilesystemStorageConfig::new(archive)),
                ..Default::default()
            },
            retry: RetryConfig {
                max_attempts: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let client = Arc::new(BackupClient::new(store, logs.clone(), &config, "roastr-ai"));
        let key = format!(
            "roastr-ai-logs/{}/application/app.log",
            Utc::now().date_naive().format("%Y-%m-%d")
        );
        client.upload_file(&log, &key, BTreeMap::new()).await.unwrap();

        let monitor = HealthMonitor::new(logs, Some(client), MonitoringConfig::default());
        let report = monitor.check().await.unwrap();

        assert_eq!(report.status, HealthLevel::Healthy);
        assert_eq!(report.statistics.total_files, 1);
        assert_eq!(report.statistics.total_size, 10);
        assert_eq!(report.statistics.per_category.len(), Category::ALL.len());
        match report.backup {
            BackupHealth::Listed { latest, count, .. } => {
                assert_eq!(count, 1);
                assert!(latest.is_some());
            }
            other => panic!("unexpected backup health: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_without_backups() {
        let dir = TempDir::new().unwrap();
        let monitor = HealthMonitor::new(
            Arc::new(FsLogStore::new(dir.path())),
            None,
            MonitoringConfig::default(),
        );
        let report = monitor.check().await.unwrap();
        assert_eq!(report.backup, BackupHealth::Disabled);
        assert_eq!(report.statistics.total_files, 0);
        assert_eq!(report.status, HealthLevel::Healthy);
    }
}
