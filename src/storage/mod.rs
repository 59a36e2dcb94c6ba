//! Pluggable object storage for log backups.
//!
//! - **S3**: AWS S3 or any S3-compatible service (requires `s3-storage`)
//! - **Filesystem**: a local directory laid out by object key
//!
//! Backends classify their failures into [`ObjectStoreError`] so the backup
//! client can tell transient conditions from fatal ones.

mod filesystem;
#[cfg(feature = "s3-storage")]
mod s3;

use std::{collections::BTreeMap, path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use filesystem::FilesystemObjectStore;
#[cfg(feature = "s3-storage")]
pub use s3::S3ObjectStore;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};

/// Errors from object storage operations.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request throttled: {message}")]
    Throttled {
        status: Option<u16>,
        message: String,
    },

    #[error("Object storage returned {status}: {message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object storage error: {0}")]
    Other(String),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

impl ObjectStoreError {
    /// Whether the failure is transient and the call may succeed if repeated.
    ///
    /// Retryable:
    /// - Timeouts and connection failures
    /// - Throttling (429, SlowDown, throughput exceeded)
    /// - Server errors (5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            ObjectStoreError::Timeout(_)
            | ObjectStoreError::Connection(_)
            | ObjectStoreError::Throttled { .. } => true,
            ObjectStoreError::Service { status, .. } => *status >= 500,
            ObjectStoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            ObjectStoreError::Other(message) => is_transient_message(message),
            ObjectStoreError::NotFound(_)
            | ObjectStoreError::AccessDenied(_)
            | ObjectStoreError::Config(_) => false,
        }
    }

    /// Classify an HTTP status with an optional service error code.
    pub fn from_status(status: u16, code: Option<String>, message: String) -> Self {
        if status == 429 || code.as_deref().is_some_and(is_throttling_code) {
            return ObjectStoreError::Throttled {
                status: Some(status),
                message,
            };
        }
        match status {
            404 => ObjectStoreError::NotFound(message),
            401 | 403 => ObjectStoreError::AccessDenied(message),
            408 => ObjectStoreError::Timeout(message),
            _ => ObjectStoreError::Service {
                status,
                code,
                message,
            },
        }
    }
}

/// Service error codes that signal throttling regardless of HTTP status.
fn is_throttling_code(code: &str) -> bool {
    matches!(
        code,
        "SlowDown"
            | "Throttling"
            | "ThrottlingException"
            | "ThrottledException"
            | "RequestThrottled"
            | "RequestThrottledException"
            | "TooManyRequestsException"
            | "RequestLimitExceeded"
            | "ProvisionedThroughputExceededException"
            | "BandwidthLimitExceeded"
    )
}

/// Fallback classification for errors only available as text.
fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();

    lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection reset")
        || lower.contains("reset by peer")
        || lower.contains("broken pipe")
        || lower.contains("econnreset")
        || lower.contains("etimedout")
        || lower.contains("throughput exceeded")
        || lower.contains("slow down")
        || lower.contains("throttl")
        || lower.contains("429")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
}

/// Upload options for a single object.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub metadata: BTreeMap<String, String>,
    /// Overrides the backend's configured storage class.
    pub storage_class: Option<String>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub location: String,
    pub e_tag: Option<String>,
}

/// Object attributes returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectHead {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub e_tag: Option<String>,
    pub storage_class: Option<String>,
    pub encrypted: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Object entry from a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
    pub e_tag: Option<String>,
}

/// One page of a listing, in ascending key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    /// More keys matched than were returned.
    pub truncated: bool,
}

/// Trait for pluggable object storage backends.
///
/// Implementations must be `Send + Sync` to support async contexts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `key`.
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> ObjectStoreResult<PutOutcome>;

    /// Fetch object attributes, or `None` if the key does not exist.
    async fn head_object(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>>;

    /// Download an object to `dest`, returning the number of bytes written.
    async fn get_to_file(&self, key: &str, dest: &Path) -> ObjectStoreResult<u64>;

    /// List up to `max_keys` objects whose key starts with `prefix`.
    async fn list_objects(&self, prefix: &str, max_keys: u32) -> ObjectStoreResult<ObjectListing>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()>;

    /// Human-readable location of a key, e.g. `s3://bucket/key`.
    fn location(&self, key: &str) -> String;

    fn backend_name(&self) -> &'static str;
}

/// Create an object storage backend from configuration.
pub async fn create_object_store(config: &StorageConfig) -> ObjectStoreResult<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Filesystem => {
            let fs_config = config.filesystem.clone().ok_or_else(|| {
                ObjectStoreError::Config(
                    "Filesystem backend requires [backup.storage.filesystem] config".to_string(),
                )
            })?;
            info!(path = %fs_config.path, "Using filesystem backup storage");
            Ok(Arc::new(FilesystemObjectStore::new(fs_config)?))
        }
        #[cfg(feature = "s3-storage")]
        StorageBackend::S3 => {
            let s3_config = config.s3.clone().ok_or_else(|| {
                ObjectStoreError::Config(
                    "S3 backend requires [backup.storage.s3] config or LOG_BACKUP_S3_BUCKET"
                        .to_string(),
                )
            })?;
            s3_config.validate().map_err(ObjectStoreError::Config)?;
            info!(bucket = %s3_config.bucket, "Using S3 backup storage");
            Ok(Arc::new(S3ObjectStore::new(s3_config).await))
        }
        #[cfg(not(feature = "s3-storage"))]
        StorageBackend::S3 => Err(ObjectStoreError::Config(
            "S3 backup storage requires the 's3-storage' feature. \
                Rebuild with: cargo build --features s3-storage"
                .to_string(),
        )),
    }
}
