//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p mediaup-api`. Storage is a `LocalStorage` in a
//! temporary directory, so no external services are needed.

pub mod auth;

use axum_test::TestServer;
use mediaup_api::services::InMemorySessionStore;
use mediaup_api::setup::{self, routes};
use mediaup_core::{Config, StorageConfig, UploadConfig};
use mediaup_storage::{LocalStorage, Storage, UrlSigner};
use std::sync::Arc;
use tempfile::TempDir;

/// Base URL the relay URLs issued by the test app point at
pub const TEST_BASE_URL: &str = "http://localhost:3000";

/// Part size used by the test app, small enough to build multi-part uploads by hand
pub const TEST_CHUNK_SIZE: u64 = 4;

/// Test application: server and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub sessions: Arc<InMemorySessionStore>,
    pub storage: Arc<dyn Storage>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

fn test_config(temp_dir: &TempDir) -> Config {
    let mut storage = StorageConfig::local(
        temp_dir.path().to_string_lossy(),
        format!("{}/media", TEST_BASE_URL),
    );
    storage.relay_base_url = Some(TEST_BASE_URL.to_string());
    storage.signing_secret = Some(auth::TEST_JWT_SECRET.to_string());

    Config {
        server_port: 0,
        environment: "test".to_string(),
        jwt_secret: auth::TEST_JWT_SECRET.to_string(),
        cors_origins: vec!["*".to_string()],
        storage,
        upload: UploadConfig {
            chunk_size_bytes: TEST_CHUNK_SIZE,
            ..UploadConfig::default()
        },
    }
}

/// Setup test app with local storage and an in-memory session registry.
pub async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    config.validate().expect("Test config must be valid");

    let secret = config
        .storage
        .signing_secret
        .clone()
        .expect("Test config sets a signing secret");
    let local = LocalStorage::new(
        temp_dir.path(),
        config
            .storage
            .local_base_url
            .clone()
            .expect("Test config sets a base URL"),
    )
    .await
    .expect("Failed to create local storage")
    .with_relay(TEST_BASE_URL, UrlSigner::new(secret));
    let storage: Arc<dyn Storage> = Arc::new(local);

    let sessions = Arc::new(InMemorySessionStore::new());
    let state = setup::build_state(config.clone(), storage.clone(), sessions.clone());
    let router = routes::setup_routes(&config, state).expect("Failed to build routes");
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        sessions,
        storage,
        _temp_dir: temp_dir,
    }
}

/// Split an absolute relay URL into the path the test server serves and its query pairs
pub fn relay_target(url: &str) -> (String, Vec<(String, String)>) {
    let rest = url.strip_prefix(TEST_BASE_URL).unwrap_or(url);
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let params = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (path.to_string(), params)
}
