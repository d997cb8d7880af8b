use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Server-side status of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Cancelled,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Cancelled | UploadStatus::Failed
        )
    }

    /// Forward-only transitions. `Failed` is reachable from any non-terminal state,
    /// `Cancelled` likewise; `Completed` only from `Uploading`.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (Pending, Uploading) => true,
            (Uploading, Completed) => true,
            (from, Cancelled) | (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// States a session can be reset to `Pending` from by a retry
    pub fn can_retry(self) -> bool {
        matches!(
            self,
            UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Cancelled => "cancelled",
            UploadStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical file category, drives size limits, allowed types and the key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogicalFileType {
    Image,
    Video,
    Avatar,
    Work,
    Other,
}

impl LogicalFileType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalFileType::Image => "image",
            LogicalFileType::Video => "video",
            LogicalFileType::Avatar => "avatar",
            LogicalFileType::Work => "work",
            LogicalFileType::Other => "other",
        }
    }
}

impl fmt::Display for LogicalFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalFileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(LogicalFileType::Image),
            "video" => Ok(LogicalFileType::Video),
            "avatar" => Ok(LogicalFileType::Avatar),
            "work" => Ok(LogicalFileType::Work),
            "other" => Ok(LogicalFileType::Other),
            other => Err(format!("Unknown file type: {}", other)),
        }
    }
}

/// How the bytes reach the storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Client PUTs straight to the presigned URL
    #[default]
    Direct,
    /// Client sends parts to the server, which assembles and stores the object
    Server,
}

/// One upload attempt, from initiation to confirmation, cancellation or expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: Uuid,
    pub owner_id: String,
    pub file_name: String,
    pub declared_size: u64,
    pub declared_content_type: String,
    pub logical_file_type: LogicalFileType,
    pub category: String,
    pub backend_key: String,
    pub presigned_url: Option<String>,
    pub upload_mode: UploadMode,
    /// Part size for server-relay uploads
    pub part_size: u64,
    pub status: UploadStatus,
    /// Retries granted so far
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Part indices whose last store attempt failed
    #[serde(default)]
    pub failed_parts: Vec<u32>,
    /// Set together with the `Completed` status
    #[serde(default)]
    pub finalized: Option<FinalizedFile>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Number of parts a server-relay upload of this session is split into
    pub fn total_parts(&self) -> u32 {
        crate::validation::part_count(self.declared_size, self.part_size)
    }

    /// Copy of the session with a new status
    pub fn with_status(&self, status: UploadStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Request to start an upload session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadRequest {
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub file_name: String,
    /// File size in bytes
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub file_size: u64,
    /// Content type (MIME type)
    #[validate(length(
        min = 1,
        max = 255,
        message = "Content type must be between 1 and 255 characters"
    ))]
    pub content_type: String,
    pub logical_type: LogicalFileType,
    /// Sub-folder inside the type prefix, defaults to "other"
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 64,
        message = "Category must be between 1 and 64 characters"
    ))]
    pub category: Option<String>,
    /// Session lifetime in seconds
    #[serde(default)]
    #[validate(range(
        min = 60,
        max = 604800,
        message = "TTL must be between 60 seconds and 7 days"
    ))]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub upload_mode: Option<UploadMode>,
}

/// Response to a successful initiation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    pub session_id: Uuid,
    /// Presigned URL for direct mode; absent in server mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    pub key: String,
    /// Seconds until the session and URL expire
    pub ttl: u64,
    pub upload_mode: UploadMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<u32>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadRequest {
    /// Size the client believes it uploaded
    #[serde(default)]
    pub actual_size: Option<u64>,
}

/// Caller-facing description of a stored file, also handed to the record sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedFile {
    pub session_id: Uuid,
    pub owner_id: String,
    pub key: String,
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub logical_type: LogicalFileType,
    pub category: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressResponse {
    pub status: UploadStatus,
    /// 0-100
    pub percentage: u8,
}

/// Full view of a session for clients deciding whether to resume, retry or give up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionDetail {
    pub session_id: Uuid,
    pub status: UploadStatus,
    /// 0-100
    pub percentage: u8,
    pub file_name: String,
    pub file_size: u64,
    pub logical_type: LogicalFileType,
    pub upload_mode: UploadMode,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Present for server-relay sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<PartsDetail>,
    pub can_resume: bool,
    /// Seconds, extrapolated from progress since creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds_remaining: Option<u64>,
    /// The finalized file once the session is completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FinalizedFile>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartsDetail {
    pub part_size: u64,
    pub total_parts: u32,
    pub uploaded: u32,
    pub failed: u32,
    pub remaining: u32,
    pub uploaded_parts: Vec<u32>,
    pub failed_parts: Vec<u32>,
}

/// A session reset to pending, with a fresh upload URL in direct mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryUploadResponse {
    pub session_id: Uuid,
    pub upload_mode: UploadMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<u32>,
    pub retry_count: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelUploadResponse {
    pub session_id: Uuid,
    pub status: UploadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartUploadResponse {
    pub index: u32,
    pub uploaded_parts: usize,
    pub total_parts: u32,
}

/// Parts already stored for a server-relay session, sorted ascending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPartsResponse {
    pub part_size: u64,
    pub total_parts: u32,
    pub uploaded_parts: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletePartsResponse {
    pub key: String,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_forward_only() {
        use UploadStatus::*;
        assert!(Pending.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Uploading));
        assert!(Pending.can_transition_to(Failed));
        assert!(Uploading.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Failed));

        assert!(Failed.can_retry());
        assert!(Uploading.can_retry());
        assert!(!Completed.can_retry());
        assert!(!Cancelled.can_retry());
    }

    #[test]
    fn sessions_without_retry_bookkeeping_still_deserialize() {
        let json = r#"{
            "id": "7f1d5a2e-8c3b-4f6a-9d2e-1b3c4d5e6f70",
            "ownerId": "user-1",
            "fileName": "a.png",
            "declaredSize": 10,
            "declaredContentType": "image/png",
            "logicalFileType": "image",
            "category": "other",
            "backendKey": "images/other/user-1/a.png",
            "presignedUrl": null,
            "uploadMode": "direct",
            "partSize": 5,
            "status": "pending",
            "createdAt": "2026-01-01T00:00:00Z",
            "expiresAt": "2026-01-01T01:00:00Z"
        }"#;
        let session: UploadSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.retry_count, 0);
        assert!(session.last_error.is_none());
        assert!(session.failed_parts.is_empty());
        assert!(session.finalized.is_none());
    }

    #[test]
    fn request_uses_camel_case_on_the_wire() {
        let req: InitiateUploadRequest = serde_json::from_str(
            r#"{"fileName":"a.mp4","fileSize":10,"contentType":"video/mp4","logicalType":"video"}"#,
        )
        .unwrap();
        assert_eq!(req.logical_type, LogicalFileType::Video);
        assert!(req.ttl.is_none());
        assert!(req.upload_mode.is_none());
    }

    #[test]
    fn request_validation_rejects_empty_name_and_zero_size() {
        let req = InitiateUploadRequest {
            file_name: String::new(),
            file_size: 0,
            content_type: "image/png".to_string(),
            logical_type: LogicalFileType::Image,
            category: None,
            ttl: None,
            upload_mode: None,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("file_name"));
        assert!(fields.contains_key("file_size"));
    }
}
