use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;
use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::ServerSideEncryption,
};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument};

use super::{
    ObjectHead, ObjectListing, ObjectStore, ObjectStoreError, ObjectStoreResult, ObjectSummary,
    PutOptions, PutOutcome,
};
use crate::config::{S3ServerSideEncryption, S3StorageConfig};

/// S3-compatible object storage backend.
///
/// Supports:
/// - AWS S3
/// - MinIO
/// - Cloudflare R2
/// - Any S3-compatible service
///
/// Requires the `s3-storage` feature.
pub struct S3ObjectStore {
    config: S3StorageConfig,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub async fn new(config: S3StorageConfig) -> Self {
        info!(bucket = %config.bucket, "Initializing S3 backup storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        // Static credentials from config, otherwise the default provider chain
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None, // session token
                None, // expiry
                "logkeeper-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Self { config, client }
    }
}

/// Map an SDK failure onto the transient/fatal taxonomy.
fn classify<E>(err: SdkError<E, HttpResponse>) -> ObjectStoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => ObjectStoreError::Timeout(message),
        SdkError::DispatchFailure(failure) => {
            if failure.is_timeout() {
                ObjectStoreError::Timeout(message)
            } else if failure.is_io() {
                ObjectStoreError::Connection(message)
            } else if failure.is_user() {
                ObjectStoreError::Config(message)
            } else {
                ObjectStoreError::Other(message)
            }
        }
        SdkError::ResponseError(response) => ObjectStoreError::from_status(
            response.raw().status().as_u16(),
            None,
            message,
        ),
        SdkError::ServiceError(service) => ObjectStoreError::from_status(
            service.raw().status().as_u16(),
            service.err().code().map(str::to_string),
            message,
        ),
        SdkError::ConstructionFailure(_) => ObjectStoreError::Config(message),
        _ => ObjectStoreError::Other(message),
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, options), fields(bucket = %self.config.bucket))]
    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        options: &PutOptions,
    ) -> ObjectStoreResult<PutOutcome> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| ObjectStoreError::Other(format!("failed to open {}: {}", source.display(), e)))?;

        let storage_class = options
            .storage_class
            .as_deref()
            .unwrap_or(&self.config.storage_class);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .storage_class(storage_class.into());

        for (name, value) in &options.metadata {
            request = request.metadata(name, value);
        }

        if let Some(sse) = &self.config.server_side_encryption {
            match sse {
                S3ServerSideEncryption::Aes256 => {
                    request = request.server_side_encryption(ServerSideEncryption::Aes256);
                }
                S3ServerSideEncryption::Kms { key_id } => {
                    request = request
                        .server_side_encryption(ServerSideEncryption::AwsKms)
                        .ssekms_key_id(key_id);
                }
            }
        }

        let output = request.send().await.map_err(|e| {
            let err = classify(e);
            error!(key, error = %err, "Failed to upload to S3");
            err
        })?;

        debug!(key, "Object uploaded to S3");
        Ok(PutOutcome {
            location: self.location(key),
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn head_object(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(SdkError::ServiceError(service)) if service.err().is_not_found() => {
                return Ok(None);
            }
            Err(e) => match classify(e) {
                ObjectStoreError::NotFound(_) => return Ok(None),
                err => return Err(err),
            },
        };

        Ok(Some(ObjectHead {
            key: key.to_string(),
            size_bytes: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: output.last_modified().and_then(to_chrono),
            e_tag: output.e_tag().map(str::to_string),
            storage_class: output.storage_class().map(|c| c.as_str().to_string()),
            encrypted: output.server_side_encryption().is_some(),
            metadata: output
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_else(BTreeMap::new),
        }))
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn get_to_file(&self, key: &str, dest: &Path) -> ObjectStoreResult<u64> {
        let output = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref service) if service.err().is_no_such_key() => {
                    ObjectStoreError::NotFound(key.to_string())
                }
                e => classify(e),
            })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut body = output.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let copied = match tokio::io::copy(&mut body, &mut file).await {
            Ok(copied) => copied,
            Err(e) => {
                drop(file);
                // Never leave a truncated download behind
                let _ = tokio::fs::remove_file(dest).await;
                return Err(ObjectStoreError::Connection(format!(
                    "failed to read S3 response body: {}",
                    e
                )));
            }
        };
        file.flush().await?;

        debug!(key = %key, bytes = copied, "Downloaded backup object");
        Ok(copied)
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn list_objects(&self, prefix: &str, max_keys: u32) -> ObjectStoreResult<ObjectListing> {
        let mut listing = ObjectListing::default();
        let mut continuation: Option<String> = None;

        // S3 caps a single page at 1000 keys
        loop {
            let remaining = max_keys as usize - listing.objects.len();
            let page_size = remaining.min(1000) as i32;

            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(prefix)
                .max_keys(page_size)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(classify)?;

            for object in output.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                listing.objects.push(ObjectSummary {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                    storage_class: object.storage_class().map(|c| c.as_str().to_string()),
                    e_tag: object.e_tag().map(str::to_string),
                });
            }

            let truncated = output.is_truncated().unwrap_or(false);
            if !truncated {
                break;
            }
            if listing.objects.len() >= max_keys as usize {
                listing.truncated = true;
                break;
            }
            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => {
                    listing.truncated = true;
                    break;
                }
            }
        }

        Ok(listing)
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let err = classify(e);
                error!(key, error = %err, "Failed to delete from S3");
                err
            })?;

        debug!(key, "Object deleted from S3");
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.config.bucket, key)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    #[test]
    fn test_s3_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<S3ObjectStore>();
    }

    #[tokio::test]
    async fn test_location_uses_bucket() {
        let store = S3ObjectStore::new(S3StorageConfig {
            bucket: "log-archive".into(),
            access_key_id: Some("AKIDEXAMPLE".into()),
            secret_access_key: Some("secret".into()),
            endpoint: Some("http://localhost:9000".into()),
            force_path_style: true,
            ..Default::default()
        })
        .await;
        assert_eq!(
            store.location("roastr-ai-logs/2024-01-15/shield/a.log"),
            "s3://log-archive/roastr-ai-logs/2024-01-15/shield/a.log"
        );
        assert_eq!(store.backend_name(), "s3");
    }

    async fn mock_store(server: &MockServer) -> S3ObjectStore {
        S3ObjectStore::new(S3StorageConfig {
            bucket: "log-archive".into(),
            access_key_id: Some("AKIDEXAMPLE".into()),
            secret_access_key: Some("secret".into()),
            endpoint: Some(server.uri()),
            force_path_style: true,
            ..Default::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_get_to_file_streams_body_to_disk() {
        let server = MockServer::start().await;
        let body = "line\n".repeat(20_000);
        Mock::given(method("GET"))
            .and(path("/log-archive/roastr-ai-logs/2024-01-15/shield/a.log"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("restored/a.log");
        let store = mock_store(&server).await;
        let written = store
            .get_to_file("roastr-ai-logs/2024-01-15/shield/a.log", &dest)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_get_to_file_missing_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>NoSuchKey</Code><Message>missing</Message></Error>",
            ))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.log");
        let store = mock_store(&server).await;
        let err = store.get_to_file("nope.log", &dest).await.unwrap_err();

        assert!(matches!(err, ObjectStoreError::NotFound(_)), "{err:?}");
        assert!(!dest.exists());
    }

    #[test]
    fn test_timestamp_conversion() {
        let dt = aws_sdk_s3::primitives::DateTime::from_secs(1_705_276_800);
        let converted = to_chrono(&dt).unwrap();
        assert_eq!(converted.to_rfc3339(), "2024-01-15T00:00:00+00:00");
    }
}
