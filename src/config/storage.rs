//! Object storage configuration for log backups.
//!
//! # Example
//!
//! ```toml
//! [backup.storage]
//! backend = "s3"
//! key_prefix = "roastr-ai-logs"
//!
//! [backup.storage.s3]
//! bucket = "my-log-archive"
//! region = "us-east-1"
//! storage_class = "STANDARD_IA"
//! server_side_encryption = { type = "aes256" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where backups are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Leading segment of every backup key: `{key_prefix}/{date}/{category}/{file}`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// S3 configuration (required when `backend = "s3"`).
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,

    /// Filesystem configuration (required when `backend = "filesystem"`).
    #[serde(default)]
    pub filesystem: Option<FilesystemStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            key_prefix: default_key_prefix(),
            s3: None,
            filesystem: None,
        }
    }
}

fn default_key_prefix() -> String {
    "roastr-ai-logs".to_string()
}

impl StorageConfig {
    /// Key prefix without leading or trailing slashes.
    pub fn normalized_prefix(&self) -> &str {
        self.key_prefix.trim_matches('/')
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.normalized_prefix().is_empty() {
            return Err("backup key_prefix cannot be empty".to_string());
        }
        match self.backend {
            StorageBackend::S3 => self
                .s3
                .as_ref()
                .ok_or_else(|| {
                    "S3 backup storage requires [backup.storage.s3] or LOG_BACKUP_S3_BUCKET"
                        .to_string()
                })?
                .validate(),
            StorageBackend::Filesystem => self
                .filesystem
                .as_ref()
                .ok_or_else(|| {
                    "Filesystem backup storage requires [backup.storage.filesystem]".to_string()
                })?
                .validate(),
        }
    }

    /// Bucket or directory name, for status reporting.
    pub fn location_name(&self) -> Option<&str> {
        match self.backend {
            StorageBackend::S3 => self.s3.as_ref().map(|s| s.bucket.as_str()),
            StorageBackend::Filesystem => self.filesystem.as_ref().map(|f| f.path.as_str()),
        }
    }
}

/// Object storage backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// S3 or any S3-compatible service.
    #[default]
    S3,
    /// Local directory, useful for on-host mirrors and testing.
    Filesystem,
}

/// S3-compatible object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// S3 bucket name.
    #[serde(default)]
    pub bucket: String,

    /// AWS region.
    /// Default: "us-east-1"
    #[serde(default = "default_region")]
    pub region: Option<String>,

    /// Endpoint override for S3-compatible archives (MinIO, R2, Ceph).
    /// When set, `region` may be omitted.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS access key ID.
    /// If not specified, uses the default credential chain (env, profile, IAM role).
    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Address the bucket as `{endpoint}/{bucket}/{key}`.
    #[serde(default)]
    pub force_path_style: bool,

    /// Storage class for uploaded backups.
    /// Default: "STANDARD_IA" (infrequent access)
    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// Server-side encryption for uploaded backups.
    /// Default: AES256 (SSE-S3)
    #[serde(default = "default_server_side_encryption")]
    pub server_side_encryption: Option<S3ServerSideEncryption>,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            storage_class: default_storage_class(),
            server_side_encryption: default_server_side_encryption(),
        }
    }
}

fn default_region() -> Option<String> {
    Some("us-east-1".to_string())
}

fn default_storage_class() -> String {
    "STANDARD_IA".to_string()
}

fn default_server_side_encryption() -> Option<S3ServerSideEncryption> {
    Some(S3ServerSideEncryption::Aes256)
}

impl fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &redacted(&self.access_key_id))
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("force_path_style", &self.force_path_style)
            .field("storage_class", &self.storage_class)
            .field("server_side_encryption", &self.server_side_encryption)
            .finish()
    }
}

impl S3StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.trim().is_empty() {
            return Err("backup.storage.s3.bucket is required".to_string());
        }
        if self.region.is_none() && self.endpoint.is_none() {
            return Err("backup.storage.s3 needs a region or an endpoint".to_string());
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(
                "S3 access_key_id and secret_access_key must be set together".to_string(),
            );
        }
        Ok(())
    }
}

/// Encryption applied by the archive to each uploaded backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum S3ServerSideEncryption {
    /// `AES256`, the archive's own keys.
    Aes256,

    /// `aws:kms` with the given key.
    Kms {
        /// KMS key ID or ARN.
        key_id: String,
    },
}

/// A local directory standing in for the bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemStorageConfig {
    /// Base directory. Objects are stored as `{path}/{key}`.
    pub path: String,

    /// Create the base directory on startup. Default: true
    #[serde(default = "default_true")]
    pub create_dir: bool,
}

impl FilesystemStorageConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            create_dir: true,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("backup.storage.filesystem.path is required".to_string());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_defaults() {
        let toml = r#"
            [s3]
            bucket = "archive"
        "#;
        let config: StorageConfig = toml::from_str(toml).unwrap();
        let s3 = config.s3.as_ref().unwrap();
        assert_eq!(config.backend, StorageBackend::S3);
        assert_eq!(config.key_prefix, "roastr-ai-logs");
        assert_eq!(s3.region.as_deref(), Some("us-east-1"));
        assert_eq!(s3.storage_class, "STANDARD_IA");
        assert_eq!(
            s3.server_side_encryption,
            Some(S3ServerSideEncryption::Aes256)
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_s3_validation() {
        let mut s3 = S3StorageConfig {
            bucket: "archive".into(),
            ..Default::default()
        };
        assert!(s3.validate().is_ok());

        s3.access_key_id = Some("AKIA".into());
        assert!(s3.validate().unwrap_err().contains("together"));

        s3.secret_access_key = Some("secret".into());
        assert!(s3.validate().is_ok());

        s3.region = None;
        assert!(s3.validate().is_err());

        s3.endpoint = Some("http://localhost:9000".into());
        assert!(s3.validate().is_ok());

        s3.bucket = "  ".into();
        assert!(s3.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let s3 = S3StorageConfig {
            bucket: "archive".into(),
            access_key_id: Some("AKIAEXAMPLE".into()),
            secret_access_key: Some("super-secret".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", s3);
        assert!(!debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_missing_backend_section() {
        let config = StorageConfig {
            backend: StorageBackend::Filesystem,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("filesystem"));
    }

    #[test]
    fn test_normalized_prefix() {
        let config = StorageConfig {
            key_prefix: "/backups/logs/".into(),
            ..Default::default()
        };
        assert_eq!(config.normalized_prefix(), "backups/logs");
    }
}
