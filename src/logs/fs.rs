use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{Category, FileStat, LogFile, LogStore, LogStoreError, LogStoreResult};

/// Log store backed by `{root}/{category_dir}` directories.
#[derive(Debug, Clone)]
pub struct FsLogStore {
    root: PathBuf,
}

impl FsLogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }

    fn io_error(path: &Path, source: std::io::Error) -> LogStoreError {
        if source.kind() == std::io::ErrorKind::NotFound {
            LogStoreError::NotFound(path.to_path_buf())
        } else {
            LogStoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

fn stat_from_metadata(metadata: &std::fs::Metadata) -> std::io::Result<FileStat> {
    Ok(FileStat {
        size_bytes: metadata.len(),
        modified_at: DateTime::<Utc>::from(metadata.modified()?),
    })
}

#[async_trait]
impl LogStore for FsLogStore {
    async fn list_files(&self, category: Category) -> LogStoreResult<Vec<LogFile>> {
        let dir = self.category_dir(category);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(category = %category, dir = %dir.display(), "Log directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Self::io_error(&dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(&dir, e))?
        {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Rotated away between readdir and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::io_error(&path, e)),
            };
            if !metadata.is_file() {
                continue;
            }

            let stat = stat_from_metadata(&metadata).map_err(|e| Self::io_error(&path, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            files.push(LogFile {
                category,
                relative_path: format!("{}/{}", category.dir_name(), file_name),
                path,
                file_name,
                size_bytes: stat.size_bytes,
                modified_at: stat.modified_at,
            });
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    async fn stat_file(&self, path: &Path) -> LogStoreResult<FileStat> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Self::io_error(path, e))?;
        stat_from_metadata(&metadata).map_err(|e| Self::io_error(path, e))
    }

    async fn delete_file(&self, path: &Path) -> LogStoreResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Log file not found during deletion");
                Ok(false)
            }
            Err(e) => Err(Self::io_error(path, e)),
        }
    }

    async fn write_entry(
        &self,
        category: Category,
        entry: &serde_json::Value,
    ) -> LogStoreResult<()> {
        let dir = self.category_dir(category);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::io_error(&dir, e))?;

        let path = dir.join(format!(
            "{}-{}.log",
            category.as_str(),
            Utc::now().format("%Y-%m-%d")
        ));
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| Self::io_error(&path, e))?;
        file.flush().await.map_err(|e| Self::io_error(&path, e))?;

        Ok(())
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
