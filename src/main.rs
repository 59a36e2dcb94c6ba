use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use clap::Parser;
use logkeeper::{
    ConfigError, MaintenanceConfig,
    alerts::{AlertDispatcher, AlertError},
    backup::{BackupClient, BackupError, BackupOptions, ListOptions},
    health::{HealthError, HealthMonitor},
    jobs::{CronSchedule, JobError, MaintenanceScheduler, SchedulerError},
    logs::{FsLogStore, LogStore},
    observability,
    retention::RetentionCleaner,
    storage::{ObjectStoreError, create_object_store},
    validation::{ValidationError, parse_backup_date},
};
use serde::Serialize;
use serde_json::json;

/// CLI arguments for the log maintenance service
#[derive(Parser, Debug)]
#[command(version, about = "Log retention, backup and alerting", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML config file. Environment overrides apply either way.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Delete log files past their retention period
    Cleanup {
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage log backups in object storage
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },
    /// Run a health check and print the report
    Health,
    /// Print log directory statistics
    Stats,
    /// Send a test alert through every channel
    AlertTest,
    /// Print job schedules and backup configuration
    Status,
}

#[derive(clap::Subcommand, Debug)]
enum BackupCommand {
    /// Upload logs for one date or the most recent days
    Upload {
        /// Date to back up (YYYY-MM-DD)
        #[arg(long, conflicts_with = "days")]
        date: Option<String>,
        /// Number of days, ending today (defaults to backup.recent_days)
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
        /// Upload even when the object already exists
        #[arg(long)]
        force: bool,
    },
    /// List backup objects
    List {
        /// Only list backups of this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Raw key prefix
        #[arg(long, conflicts_with = "date")]
        prefix: Option<String>,
        #[arg(long, default_value = "1000")]
        max_keys: u32,
    },
    /// Download a backup object
    Download {
        key: String,
        /// Destination path (defaults to {logs.dir}/restored/{basename})
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete backups past their retention period
    Clean {
        /// Defaults to backup.retention_days
        #[arg(long)]
        retention_days: Option<u32>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Check that a backup object exists
    Verify { key: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(#[from] observability::TracingError),

    #[error("Failed to open backup storage: {0}")]
    Storage(#[from] ObjectStoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match MaintenanceConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args.command, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: MaintenanceConfig) -> Result<(), CliError> {
    observability::init_tracing(&config.observability.logging)?;

    let logs: Arc<dyn LogStore> = Arc::new(FsLogStore::new(&config.logs.dir));

    match command {
        Command::Run => run_scheduler(config, logs).await,
        Command::Cleanup { dry_run } => {
            let cleaner = RetentionCleaner::new(logs);
            let result = cleaner
                .clean_old_logs(&config.cleanup.retention, dry_run)
                .await
                .map_err(JobError::from)?;
            print_json(&result)
        }
        Command::Backup { command } => {
            let client = build_backup_client(&config, logs).await?;
            run_backup_command(&config, &client, command).await
        }
        Command::Health => {
            let backup = if config.backup.enabled {
                Some(Arc::new(build_backup_client(&config, logs.clone()).await?))
            } else {
                None
            };
            let monitor = HealthMonitor::new(logs, backup, config.monitoring.clone());
            print_json(&monitor.check().await?)
        }
        Command::Stats => {
            let monitor = HealthMonitor::new(logs, None, config.monitoring.clone());
            print_json(&monitor.collect_statistics().await?)
        }
        Command::AlertTest => {
            let alerts = AlertDispatcher::from_config(&config.alerts, &config.service, logs, None)?;
            print_json(&alerts.test_alert().await)
        }
        Command::Status => print_status(&config, logs).await,
    }
}

async fn build_backup_client(
    config: &MaintenanceConfig,
    logs: Arc<dyn LogStore>,
) -> Result<BackupClient, CliError> {
    config
        .backup
        .storage
        .validate()
        .map_err(ConfigError::Validation)?;
    let store = create_object_store(&config.backup.storage).await?;
    Ok(BackupClient::new(store, logs, &config.backup, &config.service.name))
}

async fn run_scheduler(config: MaintenanceConfig, logs: Arc<dyn LogStore>) -> Result<(), CliError> {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    let backup = if config.backup.enabled {
        Some(Arc::new(build_backup_client(&config, logs.clone()).await?))
    } else {
        None
    };
    let alerts = Arc::new(AlertDispatcher::from_config(
        &config.alerts,
        &config.service,
        logs.clone(),
        None,
    )?);
    let monitor = Arc::new(HealthMonitor::new(
        logs.clone(),
        backup.clone(),
        config.monitoring.clone(),
    ));
    let cleaner = Arc::new(RetentionCleaner::new(logs));

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        logs_dir = %config.logs.dir.display(),
        "Starting log maintenance service"
    );

    let scheduler = MaintenanceScheduler::new(config, cleaner, backup, monitor, alerts);
    scheduler.start()?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping scheduled jobs...");
    scheduler.stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_backup_command(
    config: &MaintenanceConfig,
    client: &BackupClient,
    command: BackupCommand,
) -> Result<(), CliError> {
    match command {
        BackupCommand::Upload {
            date,
            days,
            dry_run,
            force,
        } => {
            let options = BackupOptions {
                dry_run,
                skip_existing: !force,
                ..Default::default()
            };
            match date {
                Some(date) => {
                    let date = parse_backup_date(&date)?;
                    print_json(&client.backup_for_date(date, &options).await?)
                }
                None => {
                    let days = days.unwrap_or(config.backup.recent_days);
                    print_json(&client.backup_recent(days, &options).await?)
                }
            }
        }
        BackupCommand::List {
            date,
            prefix,
            max_keys,
        } => {
            let date = date.as_deref().map(parse_backup_date).transpose()?;
            let listing = client
                .list_backups(&ListOptions {
                    prefix,
                    max_keys,
                    date,
                })
                .await?;
            print_json(&listing)
        }
        BackupCommand::Download { key, output } => {
            let path = client.download_backup(&key, output.as_deref()).await?;
            print_json(&json!({ "key": key, "path": path }))
        }
        BackupCommand::Clean {
            retention_days,
            dry_run,
        } => {
            let days = retention_days.unwrap_or(config.backup.retention_days);
            print_json(&client.clean_old_backups(days, dry_run).await?)
        }
        BackupCommand::Verify { key } => print_json(&client.verify_backup(&key).await?),
    }
}

async fn print_status(config: &MaintenanceConfig, logs: Arc<dyn LogStore>) -> Result<(), CliError> {
    let now = Utc::now();
    let jobs = [
        ("cleanup", config.cleanup.enabled, &config.cleanup.schedule),
        ("backup", config.backup.enabled, &config.backup.schedule),
        (
            "backup_cleanup",
            config.backup.enabled,
            &config.backup.cleanup_schedule,
        ),
        (
            "monitoring",
            config.monitoring.enabled,
            &config.monitoring.schedule,
        ),
    ]
    .into_iter()
    .map(|(name, enabled, expression)| {
        let next_run_at = CronSchedule::parse(expression)
            .ok()
            .and_then(|schedule| schedule.next_after(now));
        json!({
            "name": name,
            "enabled": enabled,
            "schedule": expression,
            "next_run_at": enabled.then_some(next_run_at).flatten(),
        })
    })
    .collect::<Vec<_>>();

    let backup = if config.backup.enabled {
        Some(build_backup_client(config, logs).await?.status())
    } else {
        None
    };

    print_json(&json!({
        "service": config.service.name,
        "environment": config.service.environment,
        "logs_dir": config.logs.dir,
        "jobs": jobs,
        "backup": backup,
        "alerts": {
            "enabled": config.alerts.enabled,
            "webhook": config.alerts.webhook.is_some(),
            "email": config.alerts.email.enabled,
            "max_alerts_per_hour": config.alerts.max_alerts_per_hour,
            "cooldown_minutes": config.alerts.cooldown_minutes,
        },
    }))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
