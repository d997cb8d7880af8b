//! Mediaup Core Library
//!
//! This crate provides the domain models, error types, configuration, upload validation and
//! the retry engine shared by the server, the storage adapters and the client.

pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, StorageConfig, UploadConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use retry::{
    retry, retry_with, AttemptTimeout, BackoffStrategy, CircuitBreaker, CircuitError,
    CircuitState, RetryPolicy, Retryable,
};
pub use storage_types::StorageBackend;
