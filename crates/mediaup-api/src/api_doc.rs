//! OpenAPI documentation, served at `/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use mediaup_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mediaup API",
        version = "0.1.0",
        description = "Upload sessions for large media files: presigned direct uploads, server-relay chunked uploads with resume, confirmation, cancellation and progress polling."
    ),
    paths(
        handlers::health::health_check,
        // Upload sessions
        handlers::upload_sessions::initiate_upload,
        handlers::upload_sessions::confirm_upload,
        handlers::upload_sessions::cancel_upload,
        handlers::upload_sessions::upload_progress,
        handlers::upload_sessions::upload_detail,
        handlers::upload_sessions::retry_upload,
        // Server-relay parts
        handlers::upload_sessions::upload_part,
        handlers::upload_sessions::list_uploaded_parts,
        handlers::upload_sessions::complete_parts,
        handlers::relay::relay_upload,
    ),
    components(
        schemas(
            models::UploadStatus,
            models::UploadMode,
            models::LogicalFileType,
            models::InitiateUploadRequest,
            models::InitiateUploadResponse,
            models::ConfirmUploadRequest,
            models::FinalizedFile,
            models::CancelUploadResponse,
            models::UploadProgressResponse,
            models::UploadSessionDetail,
            models::PartsDetail,
            models::RetryUploadResponse,
            models::PartUploadResponse,
            models::UploadedPartsResponse,
            models::CompletePartsResponse,
            handlers::relay::RelayUploadResponse,
            handlers::health::HealthResponse,
            // Error
            error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "uploads", description = "Upload session lifecycle, server-relay parts and signed relay writes"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_session_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/uploads/sessions",
            "/uploads/sessions/{id}",
            "/uploads/sessions/{id}/confirm",
            "/uploads/sessions/{id}/progress",
            "/uploads/sessions/{id}/detail",
            "/uploads/sessions/{id}/retry",
            "/uploads/sessions/{id}/parts",
            "/uploads/sessions/{id}/parts/complete",
            "/uploads/sessions/{id}/parts/{index}",
            "/uploads/relay/{key}",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
