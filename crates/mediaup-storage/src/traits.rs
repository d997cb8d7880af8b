//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mediaup_core::retry::{AttemptTimeout, Retryable};
use std::time::Duration;
use thiserror::Error;

/// Maximum number of keys removed per `delete_many` batch
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Storage operation errors
///
/// Variants are split by how a caller should react: `NotFound` and `PermissionDenied` are
/// final, `Transient` may succeed on retry.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl Retryable for StorageError {
    fn is_network_error(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<AttemptTimeout> for StorageError {
    fn from(timeout: AttemptTimeout) -> Self {
        StorageError::Transient(timeout.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of storing a payload under a generated key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

/// Object metadata as seen by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Not every backend reports it, and listings never do
    pub content_type: Option<String>,
    pub url: String,
}

/// Storage abstraction trait
///
/// Every backend (MinIO/S3, Aliyun OSS, Tencent COS, local filesystem) implements this
/// trait, so the session service and the factory never depend on a concrete provider.
///
/// **Key format:** keys are relative, `/`-separated and must not contain `..` or start
/// with `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under a generated key `{folder}/{uuid}{.ext}`
    async fn put(
        &self,
        data: Bytes,
        file_name: &str,
        content_type: &str,
        folder: Option<&str>,
    ) -> StorageResult<StoredObject>;

    /// Store `data` at an explicit key and return its public URL
    async fn put_with_key(&self, key: &str, data: Bytes, content_type: &str)
        -> StorageResult<String>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete many objects, `DELETE_BATCH_SIZE` at a time
    async fn delete_many(&self, keys: &[String]) -> StorageResult<()> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            futures::future::try_join_all(batch.iter().map(|key| self.delete(key))).await?;
            tracing::debug!(count = batch.len(), "Deleted object batch");
        }
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo>;

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// List up to `limit` objects whose key starts with `prefix`
    async fn list(&self, prefix: Option<&str>, limit: usize) -> StorageResult<Vec<ObjectInfo>>;

    /// Copy an object and return the public URL of the copy
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String>;

    /// Time-limited URL a client can PUT the object to
    async fn signed_upload_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    /// Time-limited URL a client can GET the object from
    async fn signed_download_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    fn public_url(&self, key: &str) -> String;

    /// Make sure the bucket (or root directory) exists. Safe to call repeatedly.
    async fn initialize_bucket(&self) -> StorageResult<()>;

    fn backend_type(&self) -> StorageBackend;
}
