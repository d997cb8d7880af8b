#[cfg(feature = "storage-aliyun")]
use crate::AliyunOssStorage;
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
#[cfg(feature = "storage-tencent")]
use crate::TencentCosStorage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use mediaup_core::StorageConfig;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    config
        .validate()
        .map_err(|e| StorageError::ConfigError(e.to_string()))?;

    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::Minio | StorageBackend::S3 => Ok(Arc::new(S3Storage::new(config)?)),

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::Minio | StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-aliyun")]
        StorageBackend::Aliyun => Ok(Arc::new(AliyunOssStorage::new(config)?)),

        #[cfg(not(feature = "storage-aliyun"))]
        StorageBackend::Aliyun => Err(StorageError::ConfigError(
            "Aliyun OSS backend not available (storage-aliyun feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-tencent")]
        StorageBackend::Tencent => Ok(Arc::new(TencentCosStorage::new(config)?)),

        #[cfg(not(feature = "storage-tencent"))]
        StorageBackend::Tencent => Err(StorageError::ConfigError(
            "Tencent COS backend not available (storage-tencent feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.local_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            let mut storage = LocalStorage::new(base_path, base_url).await?;
            if let (Some(relay), Some(secret)) = (&config.relay_base_url, &config.signing_secret) {
                storage = storage.with_relay(relay.clone(), crate::UrlSigner::new(secret));
            }
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

type Instance = Option<(StorageConfig, Arc<dyn Storage>)>;

fn instance_slot() -> &'static Mutex<Instance> {
    static INSTANCE: OnceLock<Mutex<Instance>> = OnceLock::new();
    INSTANCE.get_or_init(|| Mutex::new(None))
}

/// Process-wide storage adapter.
///
/// Passing a config that differs from the one the current instance was built with rebuilds
/// the instance. Passing `None` returns the current instance, which must exist.
pub async fn storage_instance(config: Option<&StorageConfig>) -> StorageResult<Arc<dyn Storage>> {
    let mut slot = instance_slot().lock().await;

    let Some(requested) = config else {
        return match slot.as_ref() {
            Some((_, storage)) => Ok(Arc::clone(storage)),
            None => Err(StorageError::ConfigError(
                "Storage has not been configured".to_string(),
            )),
        };
    };

    if let Some((current, storage)) = slot.as_ref() {
        if current == requested {
            return Ok(Arc::clone(storage));
        }
        tracing::info!(
            backend = %requested.backend,
            bucket = %requested.bucket,
            "Storage configuration changed, rebuilding adapter"
        );
    }

    let storage = create_storage(requested).await?;
    *slot = Some((requested.clone(), Arc::clone(&storage)));
    Ok(storage)
}

/// Drop the process-wide adapter so the next call rebuilds it
pub async fn reset_storage_instance() {
    *instance_slot().lock().await = None;
}
