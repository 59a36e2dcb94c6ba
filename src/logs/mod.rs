//! Log directory access.
//!
//! The orchestrator never writes or rotates application logs itself. It reads
//! and prunes the files produced by the logging library through the
//! [`LogStore`] trait, and writes its own audit entries through the same seam.

mod fs;

use std::{collections::BTreeMap, fmt, path::Path, path::PathBuf, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fs::FsLogStore;

/// Suffix of the rotation library's bookkeeping files.
const INTERNAL_METADATA_SUFFIX: &str = "-audit.json";

/// Log categories, one directory each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Application,
    Integration,
    Shield,
    Security,
    Worker,
    Audit,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Application,
        Category::Integration,
        Category::Shield,
        Category::Security,
        Category::Worker,
        Category::Audit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Application => "application",
            Category::Integration => "integration",
            Category::Shield => "shield",
            Category::Security => "security",
            Category::Worker => "worker",
            Category::Audit => "audit",
        }
    }

    /// Directory name on disk, also used as the category segment of backup keys.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Application => "application",
            Category::Integration => "integrations",
            Category::Shield => "shield",
            Category::Security => "security",
            Category::Worker => "workers",
            Category::Audit => "audit",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.dir_name() == s)
            .ok_or_else(|| format!("unknown log category '{}'", s))
    }
}

/// Whether a file is bookkeeping written by the rotation library.
///
/// These files are never cleaned and never backed up.
pub fn is_internal_metadata(file_name: &str) -> bool {
    file_name.ends_with(INTERNAL_METADATA_SUFFIX)
}

/// A log file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFile {
    pub category: Category,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the log root, e.g. `integrations/app-2024-01-15.log`.
    pub relative_path: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Size and modification time of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// File count and size for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStatistics {
    pub file_count: u64,
    pub total_size: u64,
}

/// Reference to the oldest or newest file seen during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    pub relative_path: String,
    pub modified_at: DateTime<Utc>,
}

/// Aggregated statistics across every category directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStatistics {
    pub per_category: BTreeMap<Category, CategoryStatistics>,
    pub total_files: u64,
    pub total_size: u64,
    pub oldest_file: Option<FileRef>,
    pub newest_file: Option<FileRef>,
}

impl LogStatistics {
    /// Fold a listing of files into the aggregate.
    pub fn record(&mut self, file: &LogFile) {
        let entry = self.per_category.entry(file.category).or_default();
        entry.file_count += 1;
        entry.total_size += file.size_bytes;
        self.total_files += 1;
        self.total_size += file.size_bytes;

        if self
            .oldest_file
            .as_ref()
            .is_none_or(|f| file.modified_at < f.modified_at)
        {
            self.oldest_file = Some(FileRef {
                relative_path: file.relative_path.clone(),
                modified_at: file.modified_at,
            });
        }
        if self
            .newest_file
            .as_ref()
            .is_none_or(|f| file.modified_at > f.modified_at)
        {
            self.newest_file = Some(FileRef {
                relative_path: file.relative_path.clone(),
                modified_at: file.modified_at,
            });
        }
    }
}

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("Log file not found: {0}")]
    NotFound(PathBuf),

    #[error("Log store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type LogStoreResult<T> = Result<T, LogStoreError>;

/// Access to the on-disk log directories.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// List the files directly inside a category's directory.
    ///
    /// A missing directory yields an empty list.
    async fn list_files(&self, category: Category) -> LogStoreResult<Vec<LogFile>>;

    async fn stat_file(&self, path: &Path) -> LogStoreResult<FileStat>;

    /// Delete a file.
    ///
    /// Returns `false` when the file was already gone, which is not an error.
    async fn delete_file(&self, path: &Path) -> LogStoreResult<bool>;

    /// Append a structured entry to the category's current log file.
    async fn write_entry(&self, category: Category, entry: &serde_json::Value)
    -> LogStoreResult<()>;

    /// Root directory that category directories live under.
    fn root(&self) -> &Path;

    /// Aggregate statistics over every category.
    async fn statistics(&self) -> LogStoreResult<LogStatistics> {
        let mut stats = LogStatistics::default();
        for category in Category::ALL {
            stats.per_category.entry(category).or_default();
            for file in self.list_files(category).await? {
                stats.record(&file);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn file(category: Category, name: &str, size: u64, age_days: i64) -> LogFile {
        LogFile {
            category,
            path: PathBuf::from(format!("/logs/{}/{}", category.dir_name(), name)),
            relative_path: format!("{}/{}", category.dir_name(), name),
            file_name: name.to_string(),
            size_bytes: size,
            modified_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_category_dir_names() {
        assert_eq!(Category::Integration.dir_name(), "integrations");
        assert_eq!(Category::Worker.dir_name(), "workers");
        assert_eq!(Category::Audit.dir_name(), "audit");
    }

    #[test]
    fn test_category_from_str_accepts_dir_names() {
        assert_eq!("workers".parse::<Category>().unwrap(), Category::Worker);
        assert_eq!("worker".parse::<Category>().unwrap(), Category::Worker);
        assert!("billing".parse::<Category>().is_err());
    }

    #[test]
    fn test_internal_metadata_detection() {
        assert!(is_internal_metadata("a1b2c3-audit.json"));
        assert!(!is_internal_metadata("app-2024-01-15.log"));
        assert!(!is_internal_metadata("audit-2024-01-15.log"));
    }

    #[test]
    fn test_statistics_record() {
        let mut stats = LogStatistics::default();
        stats.record(&file(Category::Application, "a.log", 100, 3));
        stats.record(&file(Category::Application, "b.log", 50, 1));
        stats.record(&file(Category::Security, "c.log", 25, 10));

        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_size, 175);
        assert_eq!(stats.per_category[&Category::Application].file_count, 2);
        assert_eq!(stats.per_category[&Category::Application].total_size, 150);
        assert_eq!(
            stats.oldest_file.unwrap().relative_path,
            "security/c.log".to_string()
        );
        assert_eq!(
            stats.newest_file.unwrap().relative_path,
            "application/b.log".to_string()
        );
    }
}
