//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::handlers::{health, relay, upload_sessions};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Json, Router,
};
use mediaup_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Extra room on top of the largest accepted payload
const BODY_LIMIT_SLACK_BYTES: u64 = 64 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    // Protected routes (require a bearer token)
    let protected_routes = session_routes().layer(axum::middleware::from_fn_with_state(
        state.auth.clone(),
        crate::auth::auth_middleware,
    ));

    let body_limit = config
        .upload
        .direct_size_limit_bytes
        .max(config.upload.chunk_size_bytes)
        .saturating_add(BODY_LIMIT_SLACK_BYTES);

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);
    tracing::info!(
        http_concurrency_limit = http_concurrency_limit,
        body_limit_bytes = body_limit,
        "HTTP limits configured"
    );

    let app = public_routes()
        .merge(protected_routes)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}

/// Public routes (no authentication required)
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        // Relay writes carry their own signature instead of a bearer token
        .route("/uploads/relay/{*key}", put(relay::relay_upload))
}

fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/uploads/sessions", post(upload_sessions::initiate_upload))
        .route(
            "/uploads/sessions/{id}",
            axum::routing::delete(upload_sessions::cancel_upload),
        )
        .route(
            "/uploads/sessions/{id}/confirm",
            post(upload_sessions::confirm_upload),
        )
        .route(
            "/uploads/sessions/{id}/progress",
            get(upload_sessions::upload_progress),
        )
        .route(
            "/uploads/sessions/{id}/detail",
            get(upload_sessions::upload_detail),
        )
        .route(
            "/uploads/sessions/{id}/retry",
            post(upload_sessions::retry_upload),
        )
        .route(
            "/uploads/sessions/{id}/parts",
            get(upload_sessions::list_uploaded_parts),
        )
        .route(
            "/uploads/sessions/{id}/parts/complete",
            post(upload_sessions::complete_parts),
        )
        .route(
            "/uploads/sessions/{id}/parts/{index}",
            put(upload_sessions::upload_part),
        )
}
