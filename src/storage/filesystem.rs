use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{
    ObjectHead, ObjectListing, ObjectStore, ObjectStoreError, ObjectStoreResult, ObjectSummary,
    PutOptions, PutOutcome,
};
use crate::config::FilesystemStorageConfig;

/// Directory under the root holding per-object metadata sidecars.
const META_DIR: &str = ".meta";

/// Filesystem object storage backend.
///
/// Objects are stored as `{path}/{key}`; upload metadata is kept in
/// `{path}/.meta/{key}.json`.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    storage_class: Option<String>,
}

impl FilesystemObjectStore {
    pub fn new(config: FilesystemStorageConfig) -> ObjectStoreResult<Self> {
        let root = PathBuf::from(&config.path);
        if config.create_dir && !root.exists() {
            info!(path = %config.path, "Creating backup storage directory");
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> ObjectStoreResult<PathBuf> {
        let relative = validate_key(key)?;
        Ok(self.root.join(relative))
    }

    fn sidecar_path(&self, key: &str) -> ObjectStoreResult<PathBuf> {
        let relative = validate_key(key)?;
        let mut path = self.root.join(META_DIR).join(relative);
        let file_name = format!(
            "{}.json",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    async fn read_sidecar(&self, key: &str) -> ObjectStoreResult<Sidecar> {
        let path = self.sidecar_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ObjectStoreError::Other(format!("corrupt metadata for {}: {}", key, e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Recursively collect every object key under the root.
    async fn collect_keys(&self) -> ObjectStoreResult<Vec<(String, std::fs::Metadata)>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    if dir == self.root && entry.file_name() == META_DIR {
                        continue;
                    }
                    pending.push(path);
                } else if metadata.is_file() {
                    if path.extension().is_some_and(|ext| ext == "tmp") {
                        continue;
                    }
                    let Ok(relative) = path.strip_prefix(&self.root) else {
                        continue;
                    };
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push((key, metadata));
                }
            }
        }

        keys.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keys)
    }
}

/// Reject keys that would escape the storage root.
fn validate_key(key: &str) -> ObjectStoreResult<PathBuf> {
    if key.is_empty() || key.starts_with('/') {
        return Err(ObjectStoreError::Config(format!("invalid object key '{}'", key)));
    }
    let path = PathBuf::from(key);
    for component in path.components() {
        match component {
            Component::Normal(part) if part != META_DIR => {}
            _ => {
                return Err(ObjectStoreError::Config(format!(
                    "invalid object key '{}'",
                    key
                )));
            }
        }
    }
    Ok(path)
}

fn modified_at(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    #[instrument(skip(self, options))]
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> ObjectStoreResult<PutOutcome> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Copy to a temp file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        tokio::fs::copy(source, &temp_path).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        let sidecar = Sidecar {
            metadata: options.metadata.clone(),
            storage_class: options.storage_class.clone(),
        };
        let sidecar_path = self.sidecar_path(key)?;
        if let Some(parent) = sidecar_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(&sidecar)
            .map_err(|e| ObjectStoreError::Other(format!("failed to encode metadata: {}", e)))?;
        tokio::fs::write(&sidecar_path, bytes).await?;

        debug!(key, path = %path.display(), "Object stored on filesystem");
        Ok(PutOutcome {
            location: self.location(key),
            e_tag: None,
        })
    }

    async fn head_object(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>> {
        let path = self.object_path(key)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sidecar = self.read_sidecar(key).await?;

        Ok(Some(ObjectHead {
            key: key.to_string(),
            size_bytes: metadata.len(),
            last_modified: modified_at(&metadata),
            e_tag: None,
            storage_class: sidecar.storage_class,
            encrypted: false,
            metadata: sidecar.metadata,
        }))
    }

    #[instrument(skip(self))]
    async fn get_to_file(&self, key: &str, dest: &Path) -> ObjectStoreResult<u64> {
        let path = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::copy(&path, dest).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !path.exists() => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, prefix: &str, max_keys: u32) -> ObjectStoreResult<ObjectListing> {
        let mut listing = ObjectListing::default();
        for (key, metadata) in self.collect_keys().await? {
            if !key.starts_with(prefix) {
                continue;
            }
            if listing.objects.len() >= max_keys as usize {
                listing.truncated = true;
                break;
            }
            let storage_class = self.read_sidecar(&key).await?.storage_class;
            listing.objects.push(ObjectSummary {
                size_bytes: metadata.len(),
                last_modified: modified_at(&metadata),
                storage_class,
                e_tag: None,
                key,
            });
        }
        Ok(listing)
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(key, "Object not found during deletion");
            }
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_file(self.sidecar_path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, key: &str) -> String {
        format!("file://{}/{}", self.root.display(), key)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store(dir: &TempDir) -> FilesystemObjectStore {
        FilesystemObjectStore::new(FilesystemStorageConfig::new(
            dir.path().join("archive").to_string_lossy(),
        ))
        .unwrap()
    }

    fn source_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_object_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let source = source_file(&dir, "app.log", b"line one\nline two\n");
        let key = "logs/2024-01-15/application/app-2024-01-15.log";

        assert!(store.head_object(key).await.unwrap().is_none());

        let options = PutOptions {
            metadata: BTreeMap::from([("service".to_string(), "roastr-ai".to_string())]),
            storage_class: Some("STANDARD_IA".to_string()),
        };
        let outcome = store.put_file(key, &source, &options).await.unwrap();
        assert!(outcome.location.starts_with("file://"));
        assert!(outcome.location.ends_with(key));

        let head = store.head_object(key).await.unwrap().unwrap();
        assert_eq!(head.size_bytes, 18);
        assert_eq!(head.metadata["service"], "roastr-ai");
        assert_eq!(head.storage_class.as_deref(), Some("STANDARD_IA"));
        assert!(head.last_modified.is_some());

        let dest = dir.path().join("restored/app.log");
        let bytes = store.get_to_file(key, &dest).await.unwrap();
        assert_eq!(bytes, 18);
        assert_eq!(std::fs::read(&dest).unwrap(), b"line one\nline two\n");

        store.delete_object(key).await.unwrap();
        assert!(store.head_object(key).await.unwrap().is_none());
        // Idempotent
        store.delete_object(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_sorted_filtered_and_truncated() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let source = source_file(&dir, "x.log", b"x");
        for key in [
            "logs/2024-01-16/shield/b.log",
            "logs/2024-01-15/shield/a.log",
            "logs/2024-01-15/audit/c.log",
            "other/2024-01-15/audit/d.log",
        ] {
            store
                .put_file(key, &source, &PutOptions::default())
                .await
                .unwrap();
        }

        let listing = store.list_objects("logs/", 10).await.unwrap();
        let keys: Vec<_> = listing.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "logs/2024-01-15/audit/c.log",
                "logs/2024-01-15/shield/a.log",
                "logs/2024-01-16/shield/b.log",
            ]
        );
        assert!(!listing.truncated);

        let listing = store.list_objects("logs/", 2).await.unwrap();
        assert_eq!(listing.objects.len(), 2);
        assert!(listing.truncated);

        let listing = store.list_objects("logs/2024-01-15", 10).await.unwrap();
        assert_eq!(listing.objects.len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let result = store
            .get_to_file("logs/missing.log", &dir.path().join("out.log"))
            .await;
        assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("logs/../../etc/passwd").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key(".meta/x.json").is_err());
        assert!(validate_key("logs/2024-01-15/audit/a.log").is_ok());
    }
}
