use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CronSchedule, JobError, JobName, JobState, SchedulerError};
use crate::{
    alerts::{AlertDispatcher, AlertKind, AlertOptions},
    backup::{
        BackupCleanupResult, BackupClient, BackupOptions, BackupSummary, RecentBackupReport,
    },
    config::MaintenanceConfig,
    health::{HealthMonitor, HealthReport},
    observability::metrics,
    retention::{CleanupResult, RetentionCleaner},
};

/// Service tag on alerts raised by scheduled jobs.
const MAINTENANCE_SERVICE: &str = "log-maintenance";

/// Outcome of the most recent run of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub name: JobName,
    pub schedule: String,
    pub state: JobState,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run: Option<JobRunSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub active_jobs: Vec<JobName>,
    pub next_runs: BTreeMap<JobName, DateTime<Utc>>,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug)]
struct JobRuntime {
    state: JobState,
    next_run_at: Option<DateTime<Utc>>,
    last_run: Option<JobRunSummary>,
}

struct ScheduledJob {
    name: JobName,
    schedule: Arc<CronSchedule>,
    runtime: Arc<Mutex<JobRuntime>>,
}

struct RunningJobs {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Everything a job body needs, shared by the job loops and manual runs.
struct JobContext {
    config: MaintenanceConfig,
    cleaner: Arc<RetentionCleaner>,
    backup: Option<Arc<BackupClient>>,
    monitor: Arc<HealthMonitor>,
    alerts: Arc<AlertDispatcher>,
}

/// Runs the maintenance jobs on their cron schedules.
///
/// Jobs are registered by [`start`](Self::start) and torn down by
/// [`stop`](Self::stop). The manual `run_*` operations work whether or not
/// the scheduler is running.
pub struct MaintenanceScheduler {
    ctx: Arc<JobContext>,
    jobs: Mutex<Vec<ScheduledJob>>,
    running: Mutex<Option<RunningJobs>>,
}

impl MaintenanceScheduler {
    pub fn new(
        config: MaintenanceConfig,
        cleaner: Arc<RetentionCleaner>,
        backup: Option<Arc<BackupClient>>,
        monitor: Arc<HealthMonitor>,
        alerts: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            ctx: Arc::new(JobContext {
                config,
                cleaner,
                backup,
                monitor,
                alerts,
            }),
            jobs: Mutex::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// Validate the configuration and spawn one task per enabled job.
    ///
    /// Nothing is registered unless every check passes. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let schedules = self.enabled_schedules()?;
        if schedules.is_empty() {
            warn!("No maintenance jobs are enabled");
        }

        let now = Utc::now();
        let token = CancellationToken::new();
        let mut jobs = Vec::with_capacity(schedules.len());
        let mut tasks = Vec::with_capacity(schedules.len());

        for (name, schedule) in schedules {
            let schedule = Arc::new(schedule);
            let next_run_at = schedule.next_after(now);
            let runtime = Arc::new(Mutex::new(JobRuntime {
                state: JobState::Idle,
                next_run_at,
                last_run: None,
            }));

            info!(
                job = %name,
                schedule = %schedule.expression(),
                next_run_at = ?next_run_at,
                "Scheduled maintenance job"
            );

            tasks.push(tokio::spawn(run_job_loop(
                name,
                schedule.clone(),
                runtime.clone(),
                self.ctx.clone(),
                token.clone(),
            )));
            jobs.push(ScheduledJob {
                name,
                schedule,
                runtime,
            });
        }

        info!(jobs = jobs.len(), "Maintenance scheduler started");
        *self.jobs.lock() = jobs;
        *running = Some(RunningJobs { token, tasks });
        Ok(())
    }

    fn enabled_schedules(&self) -> Result<Vec<(JobName, CronSchedule)>, SchedulerError> {
        let config = &self.ctx.config;
        let mut enabled = Vec::new();
        if config.cleanup.enabled {
            enabled.push((JobName::Cleanup, config.cleanup.schedule.as_str()));
        }
        if config.backup.enabled {
            enabled.push((JobName::Backup, config.backup.schedule.as_str()));
            enabled.push((JobName::BackupCleanup, config.backup.cleanup_schedule.as_str()));
        }
        if config.monitoring.enabled {
            enabled.push((JobName::Monitoring, config.monitoring.schedule.as_str()));
        }

        let schedules = enabled
            .into_iter()
            .map(|(job, expression)| {
                CronSchedule::parse(expression)
                    .map(|schedule| (job, schedule))
                    .map_err(|source| SchedulerError::InvalidSchedule { job, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if config.backup.enabled {
            config
                .backup
                .storage
                .validate()
                .map_err(SchedulerError::Config)?;
            if self.ctx.backup.is_none() {
                return Err(SchedulerError::Config(
                    "backups are enabled but no backup client was provided".to_string(),
                ));
            }
        }

        Ok(schedules)
    }

    /// Cancel every job, wait for its task to finish, then release it.
    ///
    /// A run already in progress completes first; its job reports `Stopped`
    /// meanwhile.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let running = self.running.lock().take();
        let Some(RunningJobs { token, tasks }) = running else {
            warn!("Maintenance scheduler is not running");
            return Ok(());
        };

        token.cancel();
        for job in self.jobs.lock().iter() {
            let mut runtime = job.runtime.lock();
            runtime.state = JobState::Stopped;
            runtime.next_run_at = None;
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Job task ended abnormally");
            }
        }
        self.jobs
            .lock()
            .retain(|job| job.runtime.lock().state != JobState::Stopped);

        info!("Maintenance scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        let running = self.is_running();
        let jobs: Vec<JobStatus> = self
            .jobs
            .lock()
            .iter()
            .map(|job| {
                let runtime = job.runtime.lock();
                JobStatus {
                    name: job.name,
                    schedule: job.schedule.expression().to_string(),
                    state: runtime.state,
                    next_run_at: runtime.next_run_at,
                    last_run: runtime.last_run.clone(),
                }
            })
            .collect();

        let next_runs = jobs
            .iter()
            .filter_map(|job| job.next_run_at.map(|at| (job.name, at)))
            .collect();
        let active_jobs = jobs
            .iter()
            .filter(|job| job.state != JobState::Stopped)
            .map(|job| job.name)
            .collect();

        SchedulerStatus {
            running,
            active_jobs,
            next_runs,
            jobs,
        }
    }

    /// Run a cleanup pass now with the configured retention policy.
    pub async fn run_cleanup(&self, dry_run: bool) -> Result<CleanupResult, JobError> {
        self.ctx.cleanup(dry_run).await
    }

    /// Back up the last `days` days now.
    pub async fn run_backup(
        &self,
        days: u32,
        dry_run: bool,
        skip_existing: bool,
    ) -> Result<RecentBackupReport, JobError> {
        self.ctx.backup(days, dry_run, skip_existing).await
    }

    /// Delete expired backups now.
    pub async fn run_backup_cleanup(&self, dry_run: bool) -> Result<BackupCleanupResult, JobError> {
        self.ctx.backup_cleanup(dry_run).await
    }

    pub async fn run_health_check(&self) -> Result<HealthReport, JobError> {
        Ok(self.ctx.monitor.check().await?)
    }
}

impl JobContext {
    fn backup_client(&self) -> Result<&BackupClient, JobError> {
        self.backup.as_deref().ok_or(JobError::BackupNotConfigured)
    }

    async fn cleanup(&self, dry_run: bool) -> Result<CleanupResult, JobError> {
        Ok(self
            .cleaner
            .clean_old_logs(&self.config.cleanup.retention, dry_run)
            .await?)
    }

    async fn backup(
        &self,
        days: u32,
        dry_run: bool,
        skip_existing: bool,
    ) -> Result<RecentBackupReport, JobError> {
        let options = BackupOptions {
            dry_run,
            skip_existing,
            ..Default::default()
        };
        Ok(self.backup_client()?.backup_recent(days, &options).await?)
    }

    async fn backup_cleanup(&self, dry_run: bool) -> Result<BackupCleanupResult, JobError> {
        Ok(self
            .backup_client()?
            .clean_old_backups(self.config.backup.retention_days, dry_run)
            .await?)
    }

    /// Body of one scheduled run.
    async fn run_scheduled(&self, job: JobName) -> Result<(), JobError> {
        match job {
            JobName::Cleanup => {
                let result = self.cleanup(self.config.cleanup.dry_run).await?;
                if !result.has_deletions() {
                    warn!(
                        errors = result.errors.len(),
                        "Scheduled log cleanup removed no files"
                    );
                }
            }
            JobName::Backup => {
                let report = self.backup(self.config.backup.recent_days, false, true).await?;
                if let Some(data) =
                    high_error_rate_alert(&report.summary, self.config.backup.high_error_rate_percent)
                {
                    self.alerts
                        .send_alert(
                            AlertKind::BackupHighErrorRate,
                            data,
                            AlertOptions::service(MAINTENANCE_SERVICE),
                        )
                        .await;
                }
            }
            JobName::BackupCleanup => {
                let result = self.backup_cleanup(false).await?;
                info!(
                    deleted = result.deleted.len(),
                    errors = result.errors.len(),
                    "Scheduled backup cleanup finished"
                );
            }
            JobName::Monitoring => {
                let report = self.monitor.check().await?;
                if !report.is_healthy() {
                    self.alerts
                        .send_alert(
                            AlertKind::HealthIssues,
                            json!({
                                "status": report.status,
                                "issues": report.issues,
                            }),
                            AlertOptions::service(MAINTENANCE_SERVICE),
                        )
                        .await;
                }
            }
        }
        Ok(())
    }
}

/// Alert data when the share of failed days exceeds `threshold_percent`.
fn high_error_rate_alert(summary: &BackupSummary, threshold_percent: f64) -> Option<Value> {
    let rate = summary.error_rate_percent();
    if rate <= threshold_percent {
        return None;
    }
    Some(json!({
        "error_rate": format!("{:.1}%", rate),
        "error_dates": summary
            .error_dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
        "total_days": summary.total_days,
    }))
}

async fn run_job_loop(
    name: JobName,
    schedule: Arc<CronSchedule>,
    runtime: Arc<Mutex<JobRuntime>>,
    ctx: Arc<JobContext>,
    token: CancellationToken,
) {
    // Never fire the same slot twice if the wall clock lags the timer
    let mut last_fire: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let after = last_fire.map_or(now, |fired| fired.max(now));
        let Some(next) = schedule.next_after(after) else {
            warn!(job = %name, schedule = %schedule.expression(), "Schedule has no upcoming fire time");
            break;
        };
        runtime.lock().next_run_at = Some(next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        last_fire = Some(next);
        run_tick(name, &schedule, &runtime, &ctx).await;
        if token.is_cancelled() {
            break;
        }
    }

    debug!(job = %name, "Job loop exited");
}

/// Run one tick in its own task so a panic is contained to the run.
async fn run_tick(
    name: JobName,
    schedule: &CronSchedule,
    runtime: &Mutex<JobRuntime>,
    ctx: &Arc<JobContext>,
) {
    {
        let mut runtime = runtime.lock();
        if runtime.state == JobState::Stopped {
            return;
        }
        runtime.state = JobState::Running;
    }
    let started_at = Utc::now();
    let start = Instant::now();
    info!(job = %name, "Running scheduled job");

    let job_ctx = ctx.clone();
    let joined = tokio::spawn(async move { job_ctx.run_scheduled(name).await }).await;

    let outcome = match joined {
        Ok(result) => result,
        Err(e) => Err(JobError::Panicked(panic_message(e))),
    };
    let elapsed = start.elapsed();
    metrics::record_job_run(name.as_str(), outcome.is_ok(), elapsed.as_secs_f64());

    let error = match outcome {
        Ok(()) => {
            info!(
                job = %name,
                elapsed_ms = elapsed.as_millis() as u64,
                "Scheduled job completed"
            );
            None
        }
        Err(e) => {
            error!(
                job = %name,
                schedule = %schedule.expression(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "Scheduled job failed"
            );
            ctx.alerts
                .send_alert(
                    name.failure_alert(),
                    json!({
                        "error": e.to_string(),
                        "job": name,
                        "schedule": schedule.expression(),
                        "duration_ms": elapsed.as_millis() as u64,
                    }),
                    AlertOptions::service(MAINTENANCE_SERVICE),
                )
                .await;
            Some(e.to_string())
        }
    };

    let mut runtime = runtime.lock();
    if runtime.state == JobState::Running {
        runtime.state = JobState::Idle;
    }
    runtime.last_run = Some(JobRunSummary {
        started_at,
        duration_ms: elapsed.as_millis() as u64,
        success: error.is_none(),
        error,
    });
}

fn panic_message(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        alerts::{Alert, AlertChannel, ChannelError},
        config::{
            AlertsConfig, FilesystemStorageConfig, RetentionPolicy, ServiceConfig,
            StorageBackend, StorageConfig,
        },
        logs::{Category, FsLogStore, LogStore},
        storage::FilesystemObjectStore,
    };

    #[derive(Default)]
    struct RecordingChannel {
        received: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, alert: &Alert) -> Result<Value, ChannelError> {
            self.received.lock().push(alert.clone());
            Ok(json!({"ok": true}))
        }
    }

    struct Fixture {
        dir: TempDir,
        channel: Arc<RecordingChannel>,
        scheduler: MaintenanceScheduler,
    }

    fn filesystem_storage(dir: &Path) -> StorageConfig {
        StorageConfig {
            backend: StorageBackend::Filesystem,
            key_prefix: "roastr-ai-logs".into(),
            filesystem: Some(FilesystemStorageConfig::new(
                dir.join("archive").to_string_lossy().into_owned(),
            )),
            s3: None,
        }
    }

    fn fixture(configure: impl FnOnce(&mut MaintenanceConfig, &Path), with_backup: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = MaintenanceConfig::default();
        config.backup.storage = filesystem_storage(dir.path());
        configure(&mut config, dir.path());

        let logs: Arc<dyn LogStore> = Arc::new(FsLogStore::new(dir.path().join("logs")));
        let backup = with_backup.then(|| {
            let store = FilesystemObjectStore::new(FilesystemStorageConfig::new(
                dir.path().join("archive").to_string_lossy().into_owned(),
            ))
            .unwrap();
            Arc::new(BackupClient::new(
                Arc::new(store),
                logs.clone(),
                &config.backup,
                "roastr-ai",
            ))
        });

        let channel = Arc::new(RecordingChannel::default());
        let alerts = Arc::new(AlertDispatcher::new(
            &AlertsConfig::default(),
            &ServiceConfig::default(),
            vec![channel.clone()],
        ));
        let monitor = Arc::new(HealthMonitor::new(
            logs.clone(),
            backup.clone(),
            config.monitoring.clone(),
        ));
        let scheduler = MaintenanceScheduler::new(
            config,
            Arc::new(RetentionCleaner::new(logs)),
            backup,
            monitor,
            alerts,
        );
        Fixture {
            dir,
            channel,
            scheduler,
        }
    }

    async fn wait_for_run(scheduler: &MaintenanceScheduler, job: JobName) -> JobRunSummary {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let status = scheduler.status();
                if let Some(run) = status
                    .jobs
                    .iter()
                    .find(|j| j.name == job)
                    .and_then(|j| j.last_run.clone())
                {
                    return run;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("job did not run in time")
    }

    #[tokio::test]
    async fn test_start_stop_status() {
        let f = fixture(|_, _| {}, false);

        let status = f.scheduler.status();
        assert!(!status.running);
        assert!(status.jobs.is_empty());

        f.scheduler.start().unwrap();
        let status = f.scheduler.status();
        assert!(status.running);
        // Backup is disabled by default
        assert_eq!(
            status.active_jobs,
            vec![JobName::Cleanup, JobName::Monitoring]
        );
        assert!(status.next_runs.contains_key(&JobName::Cleanup));
        assert!(status.next_runs.contains_key(&JobName::Monitoring));
        assert!(!status.next_runs.contains_key(&JobName::Backup));
        assert!(status.jobs.iter().all(|j| j.state == JobState::Idle));
        assert_eq!(status.jobs[0].schedule, "0 2 * * *");

        f.scheduler.stop().await.unwrap();
        let status = f.scheduler.status();
        assert!(!status.running);
        assert!(status.active_jobs.is_empty());
        assert!(status.next_runs.is_empty());
        assert!(status.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let f = fixture(|_, _| {}, false);
        f.scheduler.start().unwrap();
        assert!(matches!(
            f.scheduler.start(),
            Err(SchedulerError::AlreadyRunning)
        ));

        f.scheduler.stop().await.unwrap();
        f.scheduler.start().unwrap();
        f.scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_ok() {
        let f = fixture(|_, _| {}, false);
        assert!(f.scheduler.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_schedule_registers_nothing() {
        let f = fixture(|c, _| c.monitoring.schedule = "0 */6 * *".into(), false);
        let err = f.scheduler.start().unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidSchedule {
                job: JobName::Monitoring,
                ..
            }
        ));
        assert!(!f.scheduler.is_running());
        assert!(f.scheduler.status().jobs.is_empty());
    }

    #[tokio::test]
    async fn test_backup_requires_client() {
        let f = fixture(|c, _| c.backup.enabled = true, false);
        assert!(matches!(
            f.scheduler.start(),
            Err(SchedulerError::Config(_))
        ));
        assert!(!f.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_backup_requires_valid_storage() {
        let f = fixture(
            |c, _| {
                c.backup.enabled = true;
                c.backup.storage.filesystem = None;
            },
            true,
        );
        assert!(matches!(
            f.scheduler.start(),
            Err(SchedulerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_backup_jobs_registered_when_enabled() {
        let f = fixture(|c, _| c.backup.enabled = true, true);
        f.scheduler.start().unwrap();
        let status = f.scheduler.status();
        assert_eq!(
            status.active_jobs,
            vec![
                JobName::Cleanup,
                JobName::Backup,
                JobName::BackupCleanup,
                JobName::Monitoring
            ]
        );
        assert!(status.next_runs.contains_key(&JobName::BackupCleanup));
        f.scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduled_cleanup_runs() {
        let f = fixture(
            |c, _| {
                c.cleanup.schedule = "* * * * * *".into();
                c.monitoring.enabled = false;
            },
            false,
        );
        let old = f.dir.path().join("logs/application/app-old.log");
        std::fs::create_dir_all(old.parent().unwrap()).unwrap();
        std::fs::write(&old, "x").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(40 * 86_400))
            .unwrap();

        f.scheduler.start().unwrap();
        let run = wait_for_run(&f.scheduler, JobName::Cleanup).await;
        f.scheduler.stop().await.unwrap();

        assert!(run.success, "{:?}", run.error);
        assert!(!old.exists());
        assert!(f.channel.received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_sends_alert() {
        let f = fixture(
            |c, _| {
                c.cleanup.schedule = "* * * * * *".into();
                c.cleanup.retention = RetentionPolicy {
                    audit_days: 5000,
                    ..Default::default()
                };
                c.monitoring.enabled = false;
            },
            false,
        );

        f.scheduler.start().unwrap();
        let run = wait_for_run(&f.scheduler, JobName::Cleanup).await;
        f.scheduler.stop().await.unwrap();

        assert!(!run.success);
        assert!(run.error.unwrap().contains("audit"));
        let received = f.channel.received.lock();
        assert_eq!(received[0].kind, AlertKind::CleanupFailed);
        assert_eq!(received[0].data["job"], "cleanup");
        assert_eq!(received[0].data["schedule"], "* * * * * *");
        assert_eq!(received[0].service, "log-maintenance");
    }

    #[tokio::test]
    async fn test_failing_job_keeps_ticking_without_blocking_others() {
        let f = fixture(
            |c, _| {
                c.cleanup.schedule = "* * * * * *".into();
                c.cleanup.retention = RetentionPolicy {
                    audit_days: 5000,
                    ..Default::default()
                };
                c.monitoring.schedule = "* * * * * *".into();
            },
            false,
        );

        f.scheduler.start().unwrap();
        let first = wait_for_run(&f.scheduler, JobName::Cleanup).await;
        let (second, monitoring) = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let status = f.scheduler.status();
                let last_run = |name: JobName| {
                    status
                        .jobs
                        .iter()
                        .find(|j| j.name == name)
                        .and_then(|j| j.last_run.clone())
                };
                if let (Some(cleanup), Some(monitoring)) =
                    (last_run(JobName::Cleanup), last_run(JobName::Monitoring))
                    && cleanup.started_at > first.started_at
                {
                    return (cleanup, monitoring);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("jobs did not keep running");
        assert_eq!(
            f.scheduler.status().active_jobs,
            vec![JobName::Cleanup, JobName::Monitoring]
        );
        f.scheduler.stop().await.unwrap();

        assert!(!first.success);
        assert!(!second.success);
        assert!(monitoring.success, "{:?}", monitoring.error);
        // Repeat failures fall inside the cooldown
        let received = f.channel.received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, AlertKind::CleanupFailed);
    }

    #[tokio::test]
    async fn test_manual_operations() {
        let f = fixture(|_, _| {}, false);

        let result = f.scheduler.run_cleanup(true).await.unwrap();
        assert!(result.dry_run);

        let report = f.scheduler.run_health_check().await.unwrap();
        assert!(report.is_healthy());

        assert!(matches!(
            f.scheduler.run_backup(1, true, true).await,
            Err(JobError::BackupNotConfigured)
        ));
        assert!(matches!(
            f.scheduler.run_backup_cleanup(true).await,
            Err(JobError::BackupNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_manual_backup_dry_run() {
        let f = fixture(|c, _| c.backup.enabled = true, true);
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let log = f
            .dir
            .path()
            .join("logs")
            .join(Category::Application.dir_name())
            .join(format!("app-{}.log", today));
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "entry").unwrap();

        let report = f.scheduler.run_backup(1, true, true).await.unwrap();
        assert_eq!(report.summary.total_days, 1);
        assert_eq!(report.summary.total_uploaded, 1);
        assert!(!f.dir.path().join("archive/roastr-ai-logs").exists());
    }

    #[tokio::test]
    async fn test_panic_message() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(panic_message(err), "boom");

        let err = tokio::spawn(async { panic!("{} failed", "upload") })
            .await
            .unwrap_err();
        assert_eq!(panic_message(err), "upload failed");
    }

    fn summary(days: u32, error_days: &[u32]) -> BackupSummary {
        let error_dates: Vec<NaiveDate> = error_days
            .iter()
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, *d).unwrap())
            .collect();
        BackupSummary {
            total_days: days,
            total_uploaded: 0,
            total_skipped: 0,
            total_errors: error_dates.len(),
            total_size: 0,
            success_rate: f64::from(days - error_days.len() as u32) / f64::from(days),
            error_dates,
        }
    }

    #[test]
    fn test_high_error_rate_alert() {
        // 2 of 7 days failed: 28.6%
        let data = high_error_rate_alert(&summary(7, &[14, 15]), 20.0).unwrap();
        assert_eq!(data["error_rate"], "28.6%");
        assert_eq!(data["error_dates"], json!(["2024-01-14", "2024-01-15"]));

        // 1 of 7 days failed: 14.3%
        assert!(high_error_rate_alert(&summary(7, &[15]), 20.0).is_none());
        assert!(high_error_rate_alert(&summary(7, &[]), 0.0).is_none());
    }
}
