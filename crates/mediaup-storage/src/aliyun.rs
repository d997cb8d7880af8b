//! Aliyun Object Storage Service through its S3-compatible API

use crate::object::{ObjectProvider, ObjectStorage};
use crate::traits::StorageResult;
use crate::StorageBackend;
use mediaup_core::StorageConfig;
use object_store::aws::AmazonS3Builder;

pub type AliyunOssStorage = ObjectStorage<AliyunOss>;

#[derive(Debug, Clone)]
pub struct AliyunOss {
    /// Region id without the `oss-` prefix, e.g. `cn-hangzhou`
    region: String,
    /// Custom domain bound to the bucket
    custom_endpoint: Option<String>,
    secure: bool,
}

impl AliyunOss {
    fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    fn host(&self, bucket: &str) -> String {
        format!("{}.oss-{}.aliyuncs.com", bucket, self.region)
    }
}

/// Strip scheme and trailing slash from a configured endpoint
fn endpoint_host(endpoint: &str) -> &str {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

impl ObjectProvider for AliyunOss {
    fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let region = config
            .region
            .trim()
            .trim_start_matches("oss-")
            .to_string();

        let custom_endpoint = config
            .endpoint
            .as_deref()
            .map(endpoint_host)
            .filter(|host| !host.is_empty() && !host.ends_with("aliyuncs.com"))
            .map(String::from);

        Ok(Self {
            region,
            custom_endpoint,
            secure: config.secure,
        })
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Aliyun
    }

    /// OSS only accepts virtual-hosted addressing, so the endpoint carries the bucket
    fn builder(&self, bucket: &str) -> AmazonS3Builder {
        AmazonS3Builder::new()
            .with_region(self.region.clone())
            .with_bucket_name(bucket)
            .with_endpoint(format!("{}://{}", self.scheme(), self.host(bucket)))
            .with_virtual_hosted_style_request(true)
            .with_allow_http(!self.secure)
    }

    fn public_base_url(&self, bucket: &str) -> String {
        match self.custom_endpoint {
            Some(ref host) => format!("{}://{}", self.scheme(), host),
            None => format!("{}://{}", self.scheme(), self.host(bucket)),
        }
    }
}
