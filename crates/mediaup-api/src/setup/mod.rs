//! Application setup and initialization
//!
//! Wiring lives here so `main` stays small and the integration tests can build the exact
//! same router around their own storage and registry.

pub mod routes;
pub mod server;
pub mod storage;

use crate::auth::AuthState;
use crate::services::{InMemorySessionStore, SessionStore, UploadSessionService};
use crate::state::AppState;
use anyhow::{Context, Result};
use mediaup_core::{Config, StorageBackend};
use mediaup_storage::{Storage, UrlSigner};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A wired application, ready to serve and to shut down
pub struct Application {
    pub state: Arc<AppState>,
    pub router: axum::Router,
    /// Registry sweeper, stopped once the server has drained
    pub sweeper: JoinHandle<()>,
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<Application> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(crate::telemetry::LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment,
        backend = %config.storage.backend,
        "Configuration loaded and validated successfully"
    );

    let storage = storage::setup_storage(&config).await?;

    let sessions = Arc::new(InMemorySessionStore::new());
    let sweep_every = Duration::from_secs(config.upload.sweep_interval_secs.max(1));
    let sweeper = Arc::clone(&sessions).start_sweeper(sweep_every);
    tracing::info!(
        interval_secs = sweep_every.as_secs(),
        "Upload session sweeper started"
    );

    let state = build_state(config.clone(), storage, sessions);
    let router = routes::setup_routes(&config, state.clone())?;

    Ok(Application {
        state,
        router,
        sweeper,
    })
}

/// Assemble the shared state around an already-initialized storage backend and registry
pub fn build_state(
    config: Config,
    storage: Arc<dyn Storage>,
    sessions: Arc<dyn SessionStore>,
) -> Arc<AppState> {
    let mut uploads =
        UploadSessionService::new(storage.clone(), sessions, config.upload.clone());

    // Relay URLs are only issued by the local backend
    if config.storage.backend == StorageBackend::Local {
        if let Some(secret) = config.storage.signing_secret.as_deref() {
            uploads = uploads.with_relay_signer(UrlSigner::new(secret));
        }
    }

    let auth = Arc::new(AuthState::new(&config.jwt_secret));

    Arc::new(AppState {
        config,
        storage,
        uploads: Arc::new(uploads),
        auth,
    })
}
