//! Tencent Cloud Object Storage through its S3-compatible API

use crate::object::{ObjectProvider, ObjectStorage};
use crate::traits::StorageResult;
use crate::StorageBackend;
use mediaup_core::StorageConfig;
use object_store::aws::AmazonS3Builder;

pub type TencentCosStorage = ObjectStorage<TencentCos>;

#[derive(Debug, Clone)]
pub struct TencentCos {
    region: String,
}

impl TencentCos {
    /// COS bucket names carry the account id suffix (`name-1250000000`)
    fn host(&self, bucket: &str) -> String {
        format!("{}.cos.{}.myqcloud.com", bucket, self.region)
    }
}

impl ObjectProvider for TencentCos {
    fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Ok(Self {
            region: config.region.trim().to_string(),
        })
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Tencent
    }

    fn builder(&self, bucket: &str) -> AmazonS3Builder {
        AmazonS3Builder::new()
            .with_region(self.region.clone())
            .with_bucket_name(bucket)
            .with_endpoint(format!("https://{}", self.host(bucket)))
            .with_virtual_hosted_style_request(true)
    }

    fn public_base_url(&self, bucket: &str) -> String {
        format!("https://{}", self.host(bucket))
    }
}
