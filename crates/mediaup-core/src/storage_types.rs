use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// Defined in core because configuration parsing needs it before any adapter exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// MinIO or any S3-compatible server reached through an explicit endpoint
    Minio,
    /// Amazon S3
    S3,
    /// Aliyun Object Storage Service
    Aliyun,
    /// Tencent Cloud Object Storage
    Tencent,
    /// Local filesystem, written through the server
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minio" => Ok(StorageBackend::Minio),
            "s3" => Ok(StorageBackend::S3),
            "aliyun" | "oss" => Ok(StorageBackend::Aliyun),
            "tencent" | "cos" => Ok(StorageBackend::Tencent),
            "local" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Unsupported storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Minio => write!(f, "minio"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Aliyun => write!(f, "aliyun"),
            StorageBackend::Tencent => write!(f, "tencent"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}
