//! Signed relay writes for backends without native presigned URLs

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RelayQuery {
    /// Unix timestamp after which the URL is rejected
    pub expires: i64,
    /// Hex HMAC-SHA256 signature
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RelayUploadResponse {
    pub key: String,
    pub url: String,
}

#[utoipa::path(
    put,
    path = "/uploads/relay/{key}",
    tag = "uploads",
    params(
        ("key" = String, Path, description = "Object key"),
        RelayQuery
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Object stored", body = RelayUploadResponse),
        (status = 403, description = "Signature invalid or expired", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, query, headers, body),
    fields(key = %key, size_bytes = body.len(), operation = "relay_upload")
)]
pub async fn relay_upload(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let url = state
        .uploads
        .relay_put(&key, query.expires, &query.signature, body, &content_type)
        .await?;

    Ok((StatusCode::CREATED, Json(RelayUploadResponse { key, url })))
}
