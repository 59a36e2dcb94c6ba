//! Prometheus metrics for maintenance jobs.
//!
//! Provides metrics for:
//! - Log cleanup deletions
//! - Backup uploads, skips, retries and errors
//! - Alert dispatch and channel delivery
//! - Job runs and health status
//!
//! Every recording function is a no-op without the `prometheus` feature.

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: std::net::SocketAddr = config
        .listen
        .parse()
        .map_err(|e| MetricsError::Setup(format!("invalid listen address '{}': {}", config.listen, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(&[0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0])
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()?;

    tracing::info!(listen = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Cleanup
// ─────────────────────────────────────────────────────────────────────────────

/// Record log files removed (or that would be removed, under dry run) for a category.
pub fn record_log_cleanup(category: &str, files: u64, bytes: u64, dry_run: bool) {
    #[cfg(feature = "prometheus")]
    {
        let mode = if dry_run { "dry_run" } else { "live" };
        counter!("log_cleanup_files_total", "category" => category.to_string(), "mode" => mode)
            .increment(files);
        counter!("log_cleanup_bytes_total", "category" => category.to_string(), "mode" => mode)
            .increment(bytes);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (category, files, bytes, dry_run);
    }
}

/// Record a per-file cleanup failure.
pub fn record_cleanup_error(category: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("log_cleanup_errors_total", "category" => category.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = category;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backup
// ─────────────────────────────────────────────────────────────────────────────

/// Record a completed upload.
pub fn record_backup_upload(category: &str, bytes: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("backup_uploads_total", "category" => category.to_string()).increment(1);
        counter!("backup_uploaded_bytes_total", "category" => category.to_string())
            .increment(bytes);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (category, bytes);
    }
}

/// Record a file skipped by a backup run.
///
/// # Arguments
/// * `reason` - `already_exists` or `dry_run`
pub fn record_backup_skip(reason: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("backup_skipped_total", "reason" => reason.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = reason;
    }
}

/// Record a failed object storage operation (after retries).
pub fn record_backup_error(operation: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("backup_errors_total", "operation" => operation.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = operation;
    }
}

/// Record a retry of a transient failure.
pub fn record_retry(operation: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("object_storage_retries_total", "operation" => operation.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = operation;
    }
}

/// Record expired backup objects deleted.
pub fn record_backup_deletion(count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("backup_deletions_total").increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = count;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alerts
// ─────────────────────────────────────────────────────────────────────────────

/// Record an alert dispatch decision.
///
/// # Arguments
/// * `outcome` - `sent`, `failed`, `rate_limited` or `disabled`
pub fn record_alert(alert_type: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("alerts_total", "type" => alert_type.to_string(), "outcome" => outcome.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (alert_type, outcome);
    }
}

/// Record delivery through a single channel.
pub fn record_alert_channel(channel: &str, success: bool) {
    #[cfg(feature = "prometheus")]
    {
        let result = if success { "success" } else { "failure" };
        counter!("alert_channel_deliveries_total", "channel" => channel.to_string(), "result" => result)
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (channel, success);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Jobs
// ─────────────────────────────────────────────────────────────────────────────

/// Record a scheduled job tick.
pub fn record_job_run(job: &str, success: bool, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        let status = if success { "success" } else { "failure" };
        counter!("maintenance_job_runs_total", "job" => job.to_string(), "status" => status)
            .increment(1);
        histogram!("maintenance_job_duration_seconds", "job" => job.to_string())
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (job, success, duration_secs);
    }
}

/// Record the latest health status (0 = healthy, 1 = warning, 2 = error).
pub fn record_health_status(level: u8, total_log_bytes: u64) {
    #[cfg(feature = "prometheus")]
    {
        gauge!("log_health_status").set(f64::from(level));
        gauge!("log_total_size_bytes").set(total_log_bytes as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (level, total_log_bytes);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
