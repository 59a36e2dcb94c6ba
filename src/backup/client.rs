use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{Duration, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, instrument, warn};

use super::{
    BackupCleanupResult, BackupError, BackupListing, BackupObject, BackupOptions, BackupStatus,
    BackupSummary, DateBackupResult, DayOutcome, DeletedBackup, ItemFailure, ListOptions,
    RecentBackupReport, SkippedFile, UploadOutcome, UploadedFile, VerifyResult, backup_key,
    format_size,
};
use crate::{
    config::{BackupConfig, RetryConfig, StorageBackend},
    logs::{LogStore, is_internal_metadata},
    observability::metrics,
    retry::{RetryError, with_retry},
    storage::{ObjectStore, ObjectStoreError, PutOptions},
    validation::{validate_backup_date, validate_day_count, validate_retention_days},
};

/// Upper bound on objects examined by a single backup-retention sweep.
const CLEANUP_LIST_LIMIT: u32 = 100_000;

const SKIP_ALREADY_EXISTS: &str = "already_exists";

/// Client for uploading, enumerating and expiring log backups.
pub struct BackupClient {
    store: Arc<dyn ObjectStore>,
    logs: Arc<dyn LogStore>,
    retry: RetryConfig,
    prefix: String,
    service: String,
    enabled: bool,
    backend: StorageBackend,
    location_name: Option<String>,
    region: Option<String>,
}

impl BackupClient {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        logs: Arc<dyn LogStore>,
        config: &BackupConfig,
        service: &str,
    ) -> Self {
        Self {
            store,
            logs,
            retry: config.retry.clone(),
            prefix: config.storage.normalized_prefix().to_string(),
            service: service.to_string(),
            enabled: config.enabled,
            backend: config.storage.backend,
            location_name: config.storage.location_name().map(str::to_string),
            region: config.storage.s3.as_ref().and_then(|s| s.region.clone()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Upload a single local file under `key`.
    ///
    /// The stored object carries `original-size`, `uploaded-at`, `service` and
    /// `sha256` metadata in addition to the caller's entries.
    #[instrument(skip(self, extra_metadata), fields(backend = self.store.backend_name()))]
    pub async fn upload_file(
        &self,
        local_path: &Path,
        key: &str,
        extra_metadata: BTreeMap<String, String>,
    ) -> Result<UploadOutcome, BackupError> {
        let (checksum, size_bytes) = sha256_file(local_path).await?;

        let mut metadata = extra_metadata;
        metadata.insert("original-size".to_string(), size_bytes.to_string());
        metadata.insert("uploaded-at".to_string(), Utc::now().to_rfc3339());
        metadata.insert("service".to_string(), self.service.clone());
        metadata.insert("sha256".to_string(), checksum.clone());
        let options = PutOptions {
            metadata,
            storage_class: None,
        };

        let outcome = with_retry(&self.retry, "put_object", ObjectStoreError::is_retryable, || {
            self.store.put_file(key, local_path, &options)
        })
        .await
        .map_err(|source| {
            metrics::record_backup_error("upload");
            BackupError::UploadFailed {
                key: key.to_string(),
                source,
            }
        })?;

        debug!(key, size = %format_size(size_bytes), "Uploaded backup object");
        Ok(UploadOutcome {
            location: outcome.location,
            checksum,
            size_bytes,
        })
    }

    /// Back up every log file whose name embeds `date`.
    ///
    /// Rejects dates more than 24 hours ahead or more than ten years back
    /// before touching storage. Per-file failures are collected and the sweep
    /// continues.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn backup_for_date(
        &self,
        date: NaiveDate,
        options: &BackupOptions,
    ) -> Result<DateBackupResult, BackupError> {
        validate_backup_date(date, Utc::now())?;

        let date_str = date.format("%Y-%m-%d").to_string();
        let mut result = DateBackupResult::new(date, options.dry_run);

        for &category in &options.categories {
            let files = self.logs.list_files(category).await?;
            for file in files
                .into_iter()
                .filter(|f| f.file_name.contains(&date_str) && !is_internal_metadata(&f.file_name))
            {
                let key = backup_key(&self.prefix, date, category, &file.file_name);

                if options.dry_run {
                    debug!(key, "Dry run: would upload");
                    result.total_size += file.size_bytes;
                    result.uploaded.push(UploadedFile {
                        category,
                        file: file.relative_path,
                        key,
                        size_bytes: file.size_bytes,
                        location: None,
                        checksum: None,
                    });
                    continue;
                }

                if options.skip_existing {
                    match self.head(&key).await {
                        Ok(Some(_)) => {
                            debug!(key, "Backup already exists, skipping");
                            metrics::record_backup_skip(SKIP_ALREADY_EXISTS);
                            result.skipped.push(SkippedFile {
                                file: file.relative_path,
                                key,
                                reason: SKIP_ALREADY_EXISTS.to_string(),
                            });
                            continue;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(key, error = %e, "Existence check failed");
                            metrics::record_backup_error("head");
                            result.errors.push(ItemFailure {
                                item: file.relative_path,
                                error: e.to_string(),
                            });
                            continue;
                        }
                    }
                }

                let extra = BTreeMap::from([
                    ("log-type".to_string(), category.as_str().to_string()),
                    ("backup-date".to_string(), date_str.clone()),
                ]);
                match self.upload_file(&file.path, &key, extra).await {
                    Ok(outcome) => {
                        metrics::record_backup_upload(category.as_str(), outcome.size_bytes);
                        result.total_size += outcome.size_bytes;
                        result.uploaded.push(UploadedFile {
                            category,
                            file: file.relative_path,
                            key,
                            size_bytes: outcome.size_bytes,
                            location: Some(outcome.location),
                            checksum: Some(outcome.checksum),
                        });
                    }
                    Err(e) => {
                        error!(key, error = %e, "Failed to back up log file");
                        result.errors.push(ItemFailure {
                            item: file.relative_path,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            date = %date_str,
            uploaded = result.uploaded.len(),
            skipped = result.skipped.len(),
            errors = result.errors.len(),
            total_size = %format_size(result.total_size),
            "Backup for date completed"
        );
        Ok(result)
    }

    /// Back up `days` consecutive dates ending today.
    ///
    /// A failing day is recorded and the remaining days still run.
    pub async fn backup_recent(
        &self,
        days: u32,
        options: &BackupOptions,
    ) -> Result<RecentBackupReport, BackupError> {
        let days = validate_day_count(days)?;
        let today = Utc::now().date_naive();

        let mut results = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let date = today - Duration::days(i64::from(offset));
            match self.backup_for_date(date, options).await {
                Ok(result) => results.push(DayOutcome {
                    date,
                    result: Some(result),
                    error: None,
                }),
                Err(e) => {
                    error!(date = %date, error = %e, "Backup for date failed");
                    results.push(DayOutcome {
                        date,
                        result: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let summary = summarize(days, &results);
        info!(
            days,
            uploaded = summary.total_uploaded,
            skipped = summary.total_skipped,
            errors = summary.total_errors,
            success_rate = summary.success_rate,
            "Recent backup completed"
        );
        Ok(RecentBackupReport { results, summary })
    }

    /// List backup objects, optionally restricted to one date.
    pub async fn list_backups(&self, options: &ListOptions) -> Result<BackupListing, BackupError> {
        let prefix = match (options.date, &options.prefix) {
            (Some(date), _) => format!("{}/{}/", self.prefix, date.format("%Y-%m-%d")),
            (None, Some(prefix)) => prefix.clone(),
            (None, None) => format!("{}/", self.prefix),
        };

        let listing = with_retry(&self.retry, "list_objects", ObjectStoreError::is_retryable, || {
            self.store.list_objects(&prefix, options.max_keys)
        })
        .await
        .map_err(|source| storage_error("list", source))?;

        let backups: Vec<BackupObject> = listing
            .objects
            .into_iter()
            .map(|o| BackupObject {
                key: o.key,
                size_bytes: o.size_bytes,
                last_modified: o.last_modified,
                storage_tier: o.storage_class,
                checksum: o.e_tag.map(|t| t.trim_matches('"').to_string()),
            })
            .collect();
        let total_size = backups.iter().map(|b| b.size_bytes).sum();

        Ok(BackupListing {
            backups,
            truncated: listing.truncated,
            total_size,
        })
    }

    /// Download a backup object.
    ///
    /// Without a destination the file is restored to
    /// `{logs_dir}/restored/{basename}`.
    #[instrument(skip(self))]
    pub async fn download_backup(
        &self,
        key: &str,
        dest: Option<&Path>,
    ) -> Result<PathBuf, BackupError> {
        let dest = match dest {
            Some(path) => path.to_path_buf(),
            None => {
                let basename = key.rsplit('/').next().unwrap_or(key);
                self.logs.root().join("restored").join(basename)
            }
        };

        let bytes = with_retry(&self.retry, "get_object", ObjectStoreError::is_retryable, || {
            self.store.get_to_file(key, &dest)
        })
        .await
        .map_err(|source| storage_error("download", source))?;

        info!(key, dest = %dest.display(), size = %format_size(bytes), "Backup downloaded");
        Ok(dest)
    }

    /// Delete backups last modified more than `retention_days` ago.
    #[instrument(skip(self))]
    pub async fn clean_old_backups(
        &self,
        retention_days: u32,
        dry_run: bool,
    ) -> Result<BackupCleanupResult, BackupError> {
        let retention_days = validate_retention_days(i64::from(retention_days))?;
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));

        let listing = self
            .list_backups(&ListOptions {
                max_keys: CLEANUP_LIST_LIMIT,
                ..Default::default()
            })
            .await?;
        if listing.truncated {
            warn!(
                limit = CLEANUP_LIST_LIMIT,
                "Backup listing truncated, remaining objects are handled on the next run"
            );
        }

        let mut result = BackupCleanupResult {
            retention_days,
            dry_run,
            deleted: Vec::new(),
            errors: Vec::new(),
            total_size: 0,
        };

        for backup in listing.backups {
            let Some(last_modified) = backup.last_modified else {
                continue;
            };
            if last_modified >= cutoff {
                continue;
            }

            if !dry_run {
                let deleted =
                    with_retry(&self.retry, "delete_object", ObjectStoreError::is_retryable, || {
                        self.store.delete_object(&backup.key)
                    })
                    .await;
                if let Err(e) = deleted {
                    error!(key = %backup.key, error = %e, "Failed to delete expired backup");
                    metrics::record_backup_error("delete");
                    result.errors.push(ItemFailure {
                        item: backup.key,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            result.total_size += backup.size_bytes;
            result.deleted.push(DeletedBackup {
                key: backup.key,
                size_bytes: backup.size_bytes,
                last_modified,
            });
        }

        if !dry_run {
            metrics::record_backup_deletion(result.deleted.len() as u64);
        }
        info!(
            retention_days,
            dry_run,
            deleted = result.deleted.len(),
            errors = result.errors.len(),
            total_size = %format_size(result.total_size),
            "Backup cleanup completed"
        );
        Ok(result)
    }

    /// Check whether a backup object exists and report its attributes.
    pub async fn verify_backup(&self, key: &str) -> Result<VerifyResult, BackupError> {
        let head = self
            .head(key)
            .await
            .map_err(|source| storage_error("verify", source))?;

        Ok(match head {
            None => VerifyResult::missing(),
            Some(head) => VerifyResult {
                exists: true,
                size_bytes: Some(head.size_bytes),
                last_modified: head.last_modified,
                encrypted: Some(head.encrypted),
                storage_tier: head.storage_class,
                checksum: head.metadata.get("sha256").cloned(),
                metadata: head.metadata,
            },
        })
    }

    pub fn status(&self) -> BackupStatus {
        BackupStatus {
            enabled: self.enabled,
            backend: self.store.backend_name(),
            location: self.location_name.clone(),
            region: match self.backend {
                StorageBackend::S3 => self.region.clone(),
                StorageBackend::Filesystem => None,
            },
            prefix: self.prefix.clone(),
        }
    }

    async fn head(
        &self,
        key: &str,
    ) -> Result<Option<crate::storage::ObjectHead>, RetryError<ObjectStoreError>> {
        with_retry(&self.retry, "head_object", ObjectStoreError::is_retryable, || {
            self.store.head_object(key)
        })
        .await
    }
}

fn storage_error(operation: &'static str, source: RetryError<ObjectStoreError>) -> BackupError {
    metrics::record_backup_error(operation);
    BackupError::Storage { operation, source }
}

fn summarize(days: u32, results: &[DayOutcome]) -> BackupSummary {
    let mut summary = BackupSummary {
        total_days: days,
        total_uploaded: 0,
        total_skipped: 0,
        total_errors: 0,
        total_size: 0,
        error_dates: Vec::new(),
        success_rate: 1.0,
    };

    for outcome in results {
        if let Some(result) = &outcome.result {
            summary.total_uploaded += result.uploaded.len();
            summary.total_skipped += result.skipped.len();
            summary.total_errors += result.errors.len();
            summary.total_size += result.total_size;
        }
        if outcome.error.is_some() {
            summary.total_errors += 1;
        }
        if outcome.is_failure() {
            summary.error_dates.push(outcome.date);
        }
    }

    if days > 0 {
        summary.success_rate = f64::from(days - summary.error_dates.len() as u32) / f64::from(days);
    }
    summary
}

/// SHA-256 and size of a local file, read in chunks.
async fn sha256_file(path: &Path) -> Result<(String, u64), BackupError> {
    let io_err = |source| BackupError::LocalIo {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}
