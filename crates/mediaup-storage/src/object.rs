//! Storage over the S3 API
//!
//! MinIO, Amazon S3, Aliyun OSS and Tencent COS all speak the S3 protocol, so they share one
//! implementation built on `object_store`. What differs per provider (endpoint, addressing
//! style, public URL layout) lives behind [`ObjectProvider`].

use crate::keys::{generate_storage_key, join_url, validate_key};
use crate::traits::{ObjectInfo, Storage, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use http::Method;
use mediaup_core::StorageConfig;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, ObjectStoreExt, PutOptions,
    PutPayload, Result as ObjectResult,
};
use std::time::{Duration, Instant};

const BUCKET_PROBE_KEY: &str = ".mediaup-write-probe";
const BUCKET_CREATE_URL_TTL: Duration = Duration::from_secs(300);

/// Provider-specific part of an S3-compatible backend
pub trait ObjectProvider: Send + Sync + 'static {
    fn from_config(config: &StorageConfig) -> StorageResult<Self>
    where
        Self: Sized;

    fn backend(&self) -> StorageBackend;

    /// Builder pointed at the provider's S3 endpoint, without credentials
    fn builder(&self, bucket: &str) -> AmazonS3Builder;

    /// Public URL prefix for objects in `bucket`, no trailing slash
    fn public_base_url(&self, bucket: &str) -> String;
}

/// S3-protocol storage for provider `P`
pub struct ObjectStorage<P: ObjectProvider> {
    store: AmazonS3,
    provider: P,
    bucket: String,
    public_base: String,
    http: reqwest::Client,
}

impl<P: ObjectProvider> ObjectStorage<P> {
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        let provider = P::from_config(config)?;

        let mut builder = provider.builder(&config.bucket);
        if let Some(ref id) = config.access_key_id {
            builder = builder.with_access_key_id(id);
        }
        if let Some(ref secret) = config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let public_base = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| provider.public_base_url(&config.bucket));

        tracing::debug!(
            backend = %provider.backend(),
            bucket = %config.bucket,
            public_base = %public_base,
            "Object storage configured"
        );

        Ok(Self {
            store,
            provider,
            bucket: config.bucket.clone(),
            public_base,
            http: reqwest::Client::new(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Path::parse(key).map_err(|e| StorageError::InvalidKey(e.to_string()))
    }

    fn map_error(&self, err: ObjectStoreError, key: &str) -> StorageError {
        match err {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            ObjectStoreError::PermissionDenied { .. } | ObjectStoreError::Unauthenticated { .. } => {
                StorageError::PermissionDenied(err.to_string())
            }
            ObjectStoreError::InvalidPath { .. } => StorageError::InvalidKey(err.to_string()),
            other => {
                let message = other.to_string();
                if is_transient_message(&message) {
                    StorageError::Transient(message)
                } else {
                    StorageError::BackendError(message)
                }
            }
        }
    }

    async fn create_bucket(&self) -> StorageResult<()> {
        let root = Path::from("");
        let url = self
            .store
            .signed_url(Method::PUT, &root, BUCKET_CREATE_URL_TTL)
            .await
            .map_err(|e| self.map_error(e, &self.bucket))?;

        let response = self
            .http
            .put(url)
            .send()
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            tracing::info!(bucket = %self.bucket, status = %status, "Bucket ready");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(StorageError::Transient(format!(
                "Bucket creation failed with status {}: {}",
                status, body
            )))
        } else {
            Err(StorageError::BackendError(format!(
                "Bucket creation failed with status {}: {}",
                status, body
            )))
        }
    }

    /// Write and remove a probe object. Failures only mean uploads may be refused later.
    async fn probe_write_access(&self) {
        let result = async {
            self.put_with_key(BUCKET_PROBE_KEY, Bytes::from_static(b"ok"), "text/plain")
                .await?;
            self.delete(BUCKET_PROBE_KEY).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                bucket = %self.bucket,
                "Bucket write probe failed; uploads may be rejected"
            );
        }
    }
}

/// Heuristic for `object_store` generic errors, which carry no status code
fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "timed out",
        "timeout",
        "connection",
        "error sending request",
        "dns error",
        "broken pipe",
        "500 internal server error",
        "502 bad gateway",
        "503 service unavailable",
        "504 gateway timeout",
        "slowdown",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

#[async_trait]
impl<P: ObjectProvider> Storage for ObjectStorage<P> {
    async fn put(
        &self,
        data: Bytes,
        file_name: &str,
        content_type: &str,
        folder: Option<&str>,
    ) -> StorageResult<StoredObject> {
        let key = generate_storage_key(folder, file_name);
        let size = data.len() as u64;
        let url = self.put_with_key(&key, data, content_type).await?;

        Ok(StoredObject {
            key,
            url,
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn put_with_key(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        let location = Self::location(key)?;
        let size = data.len() as u64;
        let start = Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Object upload failed"
            );
            self.map_error(e, key)
        })?;

        tracing::info!(
            backend = %self.provider.backend(),
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object upload successful"
        );

        Ok(self.public_url(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let start = Instant::now();

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| {
            if !matches!(e, ObjectStoreError::NotFound { .. }) {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object download failed"
                );
            }
            self.map_error(e, key)
        })?;

        let bytes = result.bytes().await.map_err(|e| self.map_error(e, key))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object download successful"
        );

        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        let start = Instant::now();

        let result: ObjectResult<_> = self.store.delete(&location).await;
        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object delete failed"
                );
                return Err(self.map_error(e, key));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object delete successful"
        );

        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let location = Self::location(key)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        let result: ObjectResult<_> = self.store.get_opts(&location, options).await;
        let result = result.map_err(|e| self.map_error(e, key))?;

        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| v.to_string());

        Ok(ObjectInfo {
            key: key.to_string(),
            size: result.meta.size,
            last_modified: Some(result.meta.last_modified),
            content_type,
            url: self.public_url(key),
        })
    }

    async fn list(&self, prefix: Option<&str>, limit: usize) -> StorageResult<Vec<ObjectInfo>> {
        let prefix = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => Some(Self::location(p.trim_end_matches('/'))?),
            None => None,
        };

        let metas: Vec<_> = self
            .store
            .list(prefix.as_ref())
            .take(limit)
            .try_collect()
            .await
            .map_err(|e| self.map_error(e, prefix.as_ref().map(|p| p.as_ref()).unwrap_or("")))?;

        Ok(metas
            .into_iter()
            .map(|meta| {
                let key = meta.location.to_string();
                ObjectInfo {
                    url: self.public_url(&key),
                    key,
                    size: meta.size,
                    last_modified: Some(meta.last_modified),
                    content_type: None,
                }
            })
            .collect())
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String> {
        let from = Self::location(from_key)?;
        let to = Self::location(to_key)?;
        let start = Instant::now();

        let result: ObjectResult<_> = self.store.copy(&from, &to).await;
        result.map_err(|e| self.map_error(e, from_key))?;

        tracing::info!(
            from_key = %from_key,
            to_key = %to_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object copy successful"
        );

        Ok(self.public_url(to_key))
    }

    async fn signed_upload_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        let location = Self::location(key)?;
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::PUT, &location, expires_in)
            .await;

        let url = url_result.map_err(|e| self.map_error(e, key))?.to_string();

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            content_type = content_type.unwrap_or("unspecified"),
            expires_in_secs = expires_in.as_secs(),
            "Generated presigned upload URL"
        );

        Ok(url)
    }

    async fn signed_download_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let location = Self::location(key)?;
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await;

        Ok(url_result.map_err(|e| self.map_error(e, key))?.to_string())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base, key)
    }

    async fn initialize_bucket(&self) -> StorageResult<()> {
        let probe = self.store.list(None).next().await;
        match probe {
            None | Some(Ok(_)) => {
                tracing::debug!(bucket = %self.bucket, "Bucket already exists");
            }
            Some(Err(ObjectStoreError::NotFound { .. })) => {
                tracing::info!(bucket = %self.bucket, "Bucket not found, creating it");
                self.create_bucket().await?;
            }
            Some(Err(e)) => return Err(self.map_error(e, &self.bucket)),
        }

        self.probe_write_access().await;
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        self.provider.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_messages_are_recognized() {
        assert!(is_transient_message("Generic S3 error: error sending request for url"));
        assert!(is_transient_message("Server returned 503 Service Unavailable"));
        assert!(!is_transient_message("Generic S3 error: 400 Bad Request: InvalidArgument"));
    }
}
