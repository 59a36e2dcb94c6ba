//! Log backups to object storage.
//!
//! Dated log files are mirrored under `{prefix}/{YYYY-MM-DD}/{category}/{file}`.
//! Uploads are idempotent through a skip-existing head check, and every
//! storage call goes through [`crate::retry::with_retry`].

mod client;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
pub use client::BackupClient;
use serde::Serialize;
use thiserror::Error;

use crate::{
    logs::{Category, LogStoreError},
    retry::RetryError,
    storage::ObjectStoreError,
    validation::ValidationError,
};

/// Default page size when listing backups.
pub const DEFAULT_LIST_MAX_KEYS: u32 = 1000;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Upload of {key} failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: RetryError<ObjectStoreError>,
    },

    #[error("Backup {operation} failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: RetryError<ObjectStoreError>,
    },

    #[error("Failed to read {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    LogStore(#[from] LogStoreError),
}

impl BackupError {
    /// Whether the failure was caused by invalid input rather than infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(self, BackupError::Validation(_))
    }
}

/// Object key for a dated log file.
pub fn backup_key(prefix: &str, date: NaiveDate, category: Category, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        prefix.trim_matches('/'),
        date.format("%Y-%m-%d"),
        category.dir_name(),
        file_name
    )
}

/// Human-readable byte size with one decimal, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Result of a single upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub location: String,
    /// Hex SHA-256 of the uploaded content.
    pub checksum: String,
    pub size_bytes: u64,
}

/// Options for [`BackupClient::backup_for_date`].
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Record what would be uploaded without any storage I/O.
    pub dry_run: bool,
    /// Check for an existing object before uploading.
    pub skip_existing: bool,
    pub categories: Vec<Category>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_existing: true,
            categories: Category::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub category: Category,
    pub file: String,
    pub key: String,
    pub size_bytes: u64,
    /// Absent for dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub key: String,
    pub reason: String,
}

/// A per-item failure recorded while the sweep continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of backing up one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBackupResult {
    pub date: NaiveDate,
    pub dry_run: bool,
    pub uploaded: Vec<UploadedFile>,
    pub skipped: Vec<SkippedFile>,
    pub errors: Vec<ItemFailure>,
    pub total_size: u64,
}

impl DateBackupResult {
    fn new(date: NaiveDate, dry_run: bool) -> Self {
        Self {
            date,
            dry_run,
            uploaded: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            total_size: 0,
        }
    }
}

/// One day of a multi-day backup run.
#[derive(Debug, Clone, Serialize)]
pub struct DayOutcome {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DateBackupResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DayOutcome {
    /// A day fails if it errored outright or any file in it failed.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.result.as_ref().is_some_and(|r| !r.errors.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupSummary {
    pub total_days: u32,
    pub total_uploaded: usize,
    pub total_skipped: usize,
    pub total_errors: usize,
    pub total_size: u64,
    pub error_dates: Vec<NaiveDate>,
    /// `(days - error_days) / days`, in `[0, 1]`.
    pub success_rate: f64,
}

impl BackupSummary {
    /// Share of failed days as a percentage.
    pub fn error_rate_percent(&self) -> f64 {
        (1.0 - self.success_rate) * 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentBackupReport {
    pub results: Vec<DayOutcome>,
    pub summary: BackupSummary,
}

/// Options for [`BackupClient::list_backups`].
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Raw key prefix. Ignored when `date` is set.
    pub prefix: Option<String>,
    pub max_keys: u32,
    pub date: Option<NaiveDate>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            max_keys: DEFAULT_LIST_MAX_KEYS,
            date: None,
        }
    }
}

/// A backup object in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupObject {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_tier: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupListing {
    pub backups: Vec<BackupObject>,
    pub truncated: bool,
    pub total_size: u64,
}

impl BackupListing {
    pub fn latest_modified(&self) -> Option<DateTime<Utc>> {
        self.backups.iter().filter_map(|b| b.last_modified).max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedBackup {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCleanupResult {
    pub retention_days: u32,
    pub dry_run: bool,
    pub deleted: Vec<DeletedBackup>,
    pub errors: Vec<ItemFailure>,
    pub total_size: u64,
}

/// Result of [`BackupClient::verify_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl VerifyResult {
    pub fn missing() -> Self {
        Self {
            exists: false,
            size_bytes: None,
            last_modified: None,
            encrypted: None,
            storage_tier: None,
            checksum: None,
            metadata: Default::default(),
        }
    }
}

/// Backup configuration summary for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupStatus {
    /// Whether the scheduled backup jobs are enabled.
    pub enabled: bool,
    pub backend: &'static str,
    pub location: Option<String>,
    pub region: Option<String>,
    pub prefix: String,
}
