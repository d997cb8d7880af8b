//! MinIO and Amazon S3

use crate::object::{ObjectProvider, ObjectStorage};
use crate::traits::StorageResult;
use crate::StorageBackend;
use mediaup_core::StorageConfig;
use object_store::aws::AmazonS3Builder;

/// MinIO or any S3-compatible server reached through an explicit endpoint, or AWS itself
pub type S3Storage = ObjectStorage<S3Provider>;

#[derive(Debug, Clone)]
pub struct S3Provider {
    backend: StorageBackend,
    region: String,
    /// Custom endpoint for S3-compatible providers
    endpoint_url: Option<String>,
}

impl ObjectProvider for S3Provider {
    fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Ok(Self {
            backend: config.backend,
            region: config.region.clone(),
            endpoint_url: config
                .endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    fn backend(&self) -> StorageBackend {
        self.backend
    }

    fn builder(&self, bucket: &str) -> AmazonS3Builder {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(self.region.clone())
            .with_bucket_name(bucket);

        if let Some(ref endpoint) = self.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http)
                .with_virtual_hosted_style_request(false);
        }

        builder
    }

    /// Path-style `{endpoint}/{bucket}` for S3-compatible servers,
    /// `https://{bucket}.s3.{region}.amazonaws.com` otherwise
    fn public_base_url(&self, bucket: &str) -> String {
        match self.endpoint_url {
            Some(ref endpoint) => format!("{}/{}", endpoint, bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, self.region),
        }
    }
}
