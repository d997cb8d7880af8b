use crate::auth::AuthUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use mediaup_core::AppError;
use mediaup_core::models::{
    CancelUploadResponse, CompletePartsResponse, ConfirmUploadRequest, FinalizedFile,
    InitiateUploadRequest, InitiateUploadResponse, PartUploadResponse, RetryUploadResponse,
    UploadProgressResponse, UploadSessionDetail, UploadedPartsResponse,
};
use std::sync::Arc;
use uuid::Uuid;

/// Start an upload session
#[utoipa::path(
    post,
    path = "/uploads/sessions",
    tag = "uploads",
    request_body = InitiateUploadRequest,
    responses(
        (status = 201, description = "Session created", body = InitiateUploadResponse),
        (status = 400, description = "Invalid file type, size or name", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, request),
    fields(
        owner_id = %user.user_id,
        logical_type = %request.logical_type,
        operation = "initiate_upload"
    )
)]
pub async fn initiate_upload(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitiateUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.uploads.initiate(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Confirm that the file reached storage and finalize the session
#[utoipa::path(
    post,
    path = "/uploads/sessions/{id}/confirm",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    request_body = ConfirmUploadRequest,
    responses(
        (status = 200, description = "Upload finalized", body = FinalizedFile),
        (status = 400, description = "Object not uploaded yet", body = ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse),
        (status = 409, description = "Session already finalized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, body),
    fields(owner_id = %user.user_id, session_id = %id, operation = "confirm_upload")
)]
pub async fn confirm_upload(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    // The body is optional; an empty one means "nothing to report"
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ConfirmUploadRequest::default()
    } else {
        serde_json::from_slice::<ConfirmUploadRequest>(&body).map_err(AppError::from)?
    };
    let file = state.uploads.confirm(id, &user.user_id, request).await?;
    Ok(Json(file))
}

/// Cancel an upload session and delete anything already stored
#[utoipa::path(
    delete,
    path = "/uploads/sessions/{id}",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Session cancelled", body = CancelUploadResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse),
        (status = 409, description = "Session already completed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(owner_id = %user.user_id, session_id = %id, operation = "cancel_upload")
)]
pub async fn cancel_upload(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.uploads.cancel(id, &user.user_id).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/uploads/sessions/{id}/progress",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Current progress", body = UploadProgressResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state), fields(owner_id = %user.user_id, session_id = %id))]
pub async fn upload_progress(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let progress = state.uploads.progress(id, &user.user_id).await?;
    Ok(Json(progress))
}

/// Progress plus part bookkeeping, last error, retry count and a time estimate
#[utoipa::path(
    get,
    path = "/uploads/sessions/{id}/detail",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Session detail", body = UploadSessionDetail),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state), fields(owner_id = %user.user_id, session_id = %id))]
pub async fn upload_detail(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let detail = state.uploads.detail(id, &user.user_id).await?;
    Ok(Json(detail))
}

/// Reset a session to pending, re-issuing the upload URL in direct mode
#[utoipa::path(
    post,
    path = "/uploads/sessions/{id}/retry",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Session reset", body = RetryUploadResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse),
        (status = 409, description = "Session finished or out of retries", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(owner_id = %user.user_id, session_id = %id, operation = "retry_upload")
)]
pub async fn retry_upload(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.uploads.retry(id, &user.user_id).await?;
    Ok(Json(response))
}

/// Upload one part of a server-relay session
#[utoipa::path(
    put,
    path = "/uploads/sessions/{id}/parts/{index}",
    tag = "uploads",
    params(
        ("id" = Uuid, Path, description = "Upload session ID"),
        ("index" = u32, Path, description = "Zero-based part index")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Part stored", body = PartUploadResponse),
        (status = 400, description = "Index out of range or wrong part size", body = ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state, body),
    fields(owner_id = %user.user_id, session_id = %id, index = index, size_bytes = body.len())
)]
pub async fn upload_part(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, u32)>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state
        .uploads
        .upload_part(id, &user.user_id, index, body)
        .await?;
    Ok(Json(response))
}

/// Parts already stored, used by clients to resume
#[utoipa::path(
    get,
    path = "/uploads/sessions/{id}/parts",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Uploaded part indices", body = UploadedPartsResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state), fields(owner_id = %user.user_id, session_id = %id))]
pub async fn list_uploaded_parts(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.uploads.uploaded_parts(id, &user.user_id).await?;
    Ok(Json(response))
}

/// Assemble all parts into the final object
#[utoipa::path(
    post,
    path = "/uploads/sessions/{id}/parts/complete",
    tag = "uploads",
    params(("id" = Uuid, Path, description = "Upload session ID")),
    responses(
        (status = 200, description = "Parts assembled", body = CompletePartsResponse),
        (status = 400, description = "Parts missing", body = ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Unknown or expired session", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    skip(state),
    fields(owner_id = %user.user_id, session_id = %id, operation = "complete_parts")
)]
pub async fn complete_parts(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.uploads.complete_parts(id, &user.user_id).await?;
    Ok(Json(response))
}
