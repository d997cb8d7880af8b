//! Mediaup Storage Library
//!
//! This crate provides the storage abstraction used by the upload service and one adapter
//! per backend: MinIO/S3, Aliyun OSS and Tencent COS (all over the S3 protocol), plus the
//! local filesystem.
//!
//! # Storage key format
//!
//! Keys are relative, `/`-separated paths. Keys generated by [`Storage::put`] look like
//! `{folder}/{uuid}{.ext}`; the session service picks its own keys and writes them with
//! [`Storage::put_with_key`]. Keys must not contain `..` segments or a leading `/`.

#[cfg(feature = "storage-aliyun")]
pub mod aliyun;
pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod object;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
#[cfg(feature = "storage-tencent")]
pub mod tencent;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "storage-aliyun")]
pub use aliyun::AliyunOssStorage;
pub use factory::{create_storage, reset_storage_instance, storage_instance};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use mediaup_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use signing::{SignatureError, UrlSigner, RELAY_PATH};
#[cfg(feature = "storage-tencent")]
pub use tencent::TencentCosStorage;
pub use traits::{ObjectInfo, Storage, StorageError, StorageResult, StoredObject, DELETE_BATCH_SIZE};
