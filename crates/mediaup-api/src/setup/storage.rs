//! Storage setup and initialization

use anyhow::{Context, Result};
use mediaup_core::Config;
use mediaup_storage::{storage_instance, Storage};
use std::sync::Arc;

/// Build the process-wide storage adapter and make sure its bucket exists
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!(backend = %config.storage.backend, "Initializing storage...");

    let storage = storage_instance(Some(&config.storage))
        .await
        .context("Failed to create storage backend")?;

    storage
        .initialize_bucket()
        .await
        .with_context(|| format!("Failed to initialize bucket {}", config.storage.bucket))?;

    tracing::info!(
        backend = ?storage.backend_type(),
        bucket = %config.storage.bucket,
        "Storage initialized successfully"
    );

    Ok(storage)
}
