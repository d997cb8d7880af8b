//! Configuration module
//!
//! Server, upload and storage settings, all sourced from the environment (with `.env`
//! support). Storage settings are a separate value so the storage factory can compare two
//! configurations and rebuild its adapter when they differ.

use std::env;

use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const SESSION_TTL_SECS: u64 = 7200;
const DEFAULT_UPLOAD_TTL_SECS: u64 = 3600;
const CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const DIRECT_SIZE_LIMIT_MB: u64 = 100;
const SERVER_SIZE_LIMIT_MB: u64 = 1024;
const SWEEP_INTERVAL_SECS: u64 = 60;
const SIZE_MISMATCH_TOLERANCE_BYTES: u64 = 1024;
const MAX_SESSION_RETRIES: u32 = 3;

/// Object storage settings for one backend.
///
/// Compared by value: two configs are the same adapter only if every field matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers (MinIO) or a custom OSS domain
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Replaces the computed public URL prefix (CDN or public MinIO endpoint)
    pub public_base_url: Option<String>,
    /// Use https for generated URLs
    pub secure: bool,
    pub local_path: Option<String>,
    pub local_base_url: Option<String>,
    /// Server base URL that signed relay URLs point at (local backend)
    pub relay_base_url: Option<String>,
    /// HMAC secret for signed relay URLs (local backend)
    pub signing_secret: Option<String>,
}

impl StorageConfig {
    /// Minimal local-filesystem config, mostly useful in tests.
    pub fn local(path: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: "local".to_string(),
            region: "local".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            public_base_url: None,
            secure: false,
            local_path: Some(path.into()),
            local_base_url: Some(base_url.into()),
            relay_base_url: None,
            signing_secret: None,
        }
    }

    /// Build the storage config from `STORAGE_BACKEND` (or `OSS_TYPE`) and the
    /// backend-specific variables.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let backend: StorageBackend = env::var("STORAGE_BACKEND")
            .or_else(|_| env::var("OSS_TYPE"))
            .unwrap_or_else(|_| "minio".to_string())
            .parse()?;

        let relay_base_url = env::var("PUBLIC_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                let port = env::var("PORT").unwrap_or_else(|_| SERVER_PORT.to_string());
                format!("http://localhost:{}", port)
            });
        let signing_secret = env::var("RELAY_SIGNING_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .ok();

        let mut config = match backend {
            StorageBackend::Minio => Self {
                backend,
                bucket: env::var("MINIO_BUCKET").unwrap_or_else(|_| "media".to_string()),
                region: env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                endpoint: Some(
                    env::var("MINIO_ENDPOINT")
                        .unwrap_or_else(|_| "http://localhost:9000".to_string()),
                ),
                access_key_id: env::var("MINIO_ACCESS_KEY").ok(),
                secret_access_key: env::var("MINIO_SECRET_KEY").ok(),
                public_base_url: None,
                secure: false,
                local_path: None,
                local_base_url: None,
                relay_base_url: None,
                signing_secret: None,
            },
            StorageBackend::S3 => Self {
                backend,
                bucket: env::var("S3_BUCKET")
                    .map_err(|_| anyhow::anyhow!("S3_BUCKET must be set when using S3"))?,
                region: env::var("S3_REGION")
                    .or_else(|_| env::var("AWS_REGION"))
                    .map_err(|_| anyhow::anyhow!("S3_REGION or AWS_REGION must be set"))?,
                endpoint: env::var("S3_ENDPOINT").ok(),
                access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                public_base_url: None,
                secure: true,
                local_path: None,
                local_base_url: None,
                relay_base_url: None,
                signing_secret: None,
            },
            StorageBackend::Aliyun => Self {
                backend,
                bucket: env::var("OSS_BUCKET")
                    .map_err(|_| anyhow::anyhow!("OSS_BUCKET must be set when using Aliyun OSS"))?,
                region: env::var("OSS_REGION").unwrap_or_else(|_| "oss-cn-hangzhou".to_string()),
                endpoint: env::var("OSS_ENDPOINT").ok().filter(|s| !s.is_empty()),
                access_key_id: env::var("OSS_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("OSS_ACCESS_KEY_SECRET").ok(),
                public_base_url: None,
                secure: env::var("OSS_SECURE")
                    .map(|v| v.to_lowercase() != "false")
                    .unwrap_or(true),
                local_path: None,
                local_base_url: None,
                relay_base_url: None,
                signing_secret: None,
            },
            StorageBackend::Tencent => Self {
                backend,
                bucket: env::var("COS_BUCKET")
                    .map_err(|_| anyhow::anyhow!("COS_BUCKET must be set when using Tencent COS"))?,
                region: env::var("COS_REGION").unwrap_or_else(|_| "ap-guangzhou".to_string()),
                endpoint: None,
                access_key_id: env::var("COS_SECRET_ID").ok(),
                secret_access_key: env::var("COS_SECRET_KEY").ok(),
                public_base_url: None,
                secure: true,
                local_path: None,
                local_base_url: None,
                relay_base_url: None,
                signing_secret: None,
            },
            StorageBackend::Local => Self {
                local_path: Some(
                    env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./data/uploads".to_string()),
                ),
                local_base_url: Some(
                    env::var("LOCAL_STORAGE_BASE_URL")
                        .unwrap_or_else(|_| "http://localhost:3000/media".to_string()),
                ),
                ..Self::local(String::new(), String::new())
            },
        };

        // CDN_BASE_URL maps to the bucket root; a public MinIO endpoint is path-style
        config.public_base_url = env::var("CDN_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| {
                env::var("MINIO_PUBLIC_ENDPOINT")
                    .ok()
                    .filter(|s| !s.is_empty() && backend == StorageBackend::Minio)
                    .map(|e| format!("{}/{}", e.trim_end_matches('/'), config.bucket))
            });
        if backend == StorageBackend::Local {
            config.relay_base_url = Some(relay_base_url);
            config.signing_secret = signing_secret;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("Storage bucket name must not be empty"));
        }

        match self.backend {
            StorageBackend::Aliyun | StorageBackend::Tencent => {
                if self.access_key_id.is_none() || self.secret_access_key.is_none() {
                    return Err(anyhow::anyhow!(
                        "{} storage requires an access key id and secret",
                        self.backend
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_path.as_deref().unwrap_or_default().is_empty() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_base_url.as_deref().unwrap_or_default().is_empty() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Minio | StorageBackend::S3 => {}
        }

        Ok(())
    }
}

/// Upload session and transfer limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadConfig {
    /// Minimum lifetime of a registry entry
    pub session_ttl_secs: u64,
    /// Session expiry and presigned URL lifetime when the client does not ask for one
    pub default_ttl_secs: u64,
    /// Part size for server-relay chunked uploads
    pub chunk_size_bytes: u64,
    /// Larger files are switched to server-relay mode
    pub direct_size_limit_bytes: u64,
    /// Larger files are rejected in server-relay mode
    pub server_size_limit_bytes: u64,
    pub sweep_interval_secs: u64,
    /// Declared vs actual size difference tolerated without a warning
    pub size_mismatch_tolerance_bytes: u64,
    /// How many times one session may be reset by a retry
    pub max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: SESSION_TTL_SECS,
            default_ttl_secs: DEFAULT_UPLOAD_TTL_SECS,
            chunk_size_bytes: CHUNK_SIZE_BYTES,
            direct_size_limit_bytes: DIRECT_SIZE_LIMIT_MB * 1024 * 1024,
            server_size_limit_bytes: SERVER_SIZE_LIMIT_MB * 1024 * 1024,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
            size_mismatch_tolerance_bytes: SIZE_MISMATCH_TOLERANCE_BYTES,
            max_retries: MAX_SESSION_RETRIES,
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_ttl_secs: env::var("UPLOAD_SESSION_TTL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.session_ttl_secs),
            default_ttl_secs: env::var("UPLOAD_DEFAULT_TTL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_ttl_secs),
            chunk_size_bytes: env::var("UPLOAD_CHUNK_SIZE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &u64| n > 0)
                .unwrap_or(defaults.chunk_size_bytes),
            direct_size_limit_bytes: env::var("UPLOAD_DIRECT_SIZE_LIMIT_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.direct_size_limit_bytes),
            server_size_limit_bytes: env::var("UPLOAD_SERVER_SIZE_LIMIT_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.server_size_limit_bytes),
            sweep_interval_secs: env::var("UPLOAD_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            size_mismatch_tolerance_bytes: defaults.size_mismatch_tolerance_bytes,
            max_retries: env::var("UPLOAD_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            cors_origins,
            storage: StorageConfig::from_env()?,
            upload: UploadConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.upload.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("UPLOAD_CHUNK_SIZE_BYTES must be positive"));
        }

        self.storage.validate()
    }
}
