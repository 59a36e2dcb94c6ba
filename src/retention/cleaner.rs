use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::{CategoryCleanup, CleanupError, CleanupFailure, CleanupResult};
use crate::{
    backup::format_size,
    config::RetentionPolicy,
    logs::{Category, LogStore, is_internal_metadata},
    observability::metrics,
    validation::validate_retention_days,
};

/// Deletes log files that have outlived their category's retention period.
pub struct RetentionCleaner {
    logs: Arc<dyn LogStore>,
}

impl RetentionCleaner {
    pub fn new(logs: Arc<dyn LogStore>) -> Self {
        Self { logs }
    }

    /// Run a cleanup pass over every category.
    pub async fn clean_old_logs(
        &self,
        policy: &RetentionPolicy,
        dry_run: bool,
    ) -> Result<CleanupResult, CleanupError> {
        self.clean_old_logs_at(policy, dry_run, Utc::now()).await
    }

    /// Run a cleanup pass with an explicit reference time.
    ///
    /// The whole policy is validated before any file is touched. Per-file and
    /// per-category failures after that are collected in the result.
    pub async fn clean_old_logs_at(
        &self,
        policy: &RetentionPolicy,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<CleanupResult, CleanupError> {
        for (category, days) in policy.entries() {
            validate_retention_days(i64::from(days))
                .map_err(|source| CleanupError::InvalidPolicy { category, source })?;
        }

        let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };
        let mut result = CleanupResult {
            dry_run,
            ..Default::default()
        };

        for (category, days) in policy.entries() {
            let cutoff = now - Duration::days(i64::from(days));
            let cleaned = self
                .clean_category(category, cutoff, dry_run, &mut result.errors)
                .await;

            if cleaned.files_removed > 0 {
                debug!(
                    category = %category,
                    retention_days = days,
                    files = cleaned.files_removed,
                    size = %format_size(cleaned.size_freed),
                    "Category cleanup complete{}",
                    dry_run_msg
                );
                metrics::record_log_cleanup(
                    category.as_str(),
                    cleaned.files_removed,
                    cleaned.size_freed,
                    dry_run,
                );
            }

            result.files_removed += cleaned.files_removed;
            result.size_freed += cleaned.size_freed;
            result.per_category.insert(category, cleaned);
        }

        info!(
            files_removed = result.files_removed,
            size_freed = %format_size(result.size_freed),
            errors = result.errors.len(),
            dry_run,
            "Log cleanup complete{}",
            dry_run_msg
        );
        Ok(result)
    }

    async fn clean_category(
        &self,
        category: Category,
        cutoff: DateTime<Utc>,
        dry_run: bool,
        errors: &mut Vec<CleanupFailure>,
    ) -> CategoryCleanup {
        let mut cleaned = CategoryCleanup::default();

        let files = match self.logs.list_files(category).await {
            Ok(files) => files,
            Err(e) => {
                error!(category = %category, error = %e, "Failed to list log files");
                metrics::record_cleanup_error(category.as_str());
                errors.push(CleanupFailure {
                    category,
                    file: None,
                    error: e.to_string(),
                });
                return cleaned;
            }
        };

        for file in files {
            if is_internal_metadata(&file.file_name) || file.modified_at >= cutoff {
                continue;
            }

            if dry_run {
                info!(
                    file = %file.relative_path,
                    modified_at = %file.modified_at,
                    "DRY RUN: Would delete log file"
                );
            } else {
                match self.logs.delete_file(&file.path).await {
                    Ok(true) => {}
                    // Rotated away since listing
                    Ok(false) => continue,
                    Err(e) => {
                        warn!(file = %file.relative_path, error = %e, "Failed to delete log file");
                        metrics::record_cleanup_error(category.as_str());
                        errors.push(CleanupFailure {
                            category,
                            file: Some(file.relative_path),
                            error: e.to_string(),
                        });
                        continue;
                    }
                }
            }

            cleaned.files_removed += 1;
            cleaned.size_freed += file.size_bytes;
        }

        cleaned
    }
}
