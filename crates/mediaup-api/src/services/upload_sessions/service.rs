//! Upload session lifecycle
//!
//! initiate → (client uploads directly, through the relay, or part by part) → confirm.
//! Cancellation and progress polling are available until the session reaches a terminal
//! state. Every operation re-checks ownership and expiry against the registry entry.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use mediaup_core::models::{
    CancelUploadResponse, CompletePartsResponse, ConfirmUploadRequest, FinalizedFile,
    InitiateUploadRequest, InitiateUploadResponse, PartUploadResponse, PartsDetail,
    RetryUploadResponse, UploadMode, UploadProgressResponse, UploadSession, UploadSessionDetail,
    UploadStatus, UploadedPartsResponse,
};
use mediaup_core::validation::{build_object_key, part_range, validate_upload};
use mediaup_core::{retry_with, AppError, RetryPolicy, Retryable, UploadConfig};
use mediaup_storage::{Storage, StorageError, UrlSigner};
use uuid::Uuid;
use validator::Validate;

use super::sink::{LoggingRecordSink, MediaRecordSink};
use super::store::{session_key, SessionStore};
use crate::error::app_error_from_storage;

const DEFAULT_CATEGORY: &str = "other";
const PART_CONTENT_TYPE: &str = "application/octet-stream";

fn parts_prefix(backend_key: &str) -> String {
    format!("{}.parts/", backend_key)
}

fn part_key(backend_key: &str, index: u32) -> String {
    format!("{}{:06}", parts_prefix(backend_key), index)
}

pub struct UploadSessionService {
    storage: Arc<dyn Storage>,
    sessions: Arc<dyn SessionStore>,
    sink: Arc<dyn MediaRecordSink>,
    relay_signer: Option<UrlSigner>,
    config: UploadConfig,
    presign_policy: RetryPolicy,
}

impl UploadSessionService {
    pub fn new(
        storage: Arc<dyn Storage>,
        sessions: Arc<dyn SessionStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            sessions,
            sink: Arc::new(LoggingRecordSink),
            relay_signer: None,
            config,
            presign_policy: RetryPolicy::upload(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MediaRecordSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Accept signed relay writes verified with `signer`
    pub fn with_relay_signer(mut self, signer: UrlSigner) -> Self {
        self.relay_signer = Some(signer);
        self
    }

    pub fn with_presign_policy(mut self, policy: RetryPolicy) -> Self {
        self.presign_policy = policy;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Validate the request, pick a key and upload mode, and register a pending session
    #[tracing::instrument(skip(self, request), fields(owner_id = %owner_id, file_name = %request.file_name, size_bytes = request.file_size))]
    pub async fn initiate(
        &self,
        owner_id: &str,
        request: InitiateUploadRequest,
    ) -> Result<InitiateUploadResponse, AppError> {
        request.validate()?;
        validate_upload(
            &request.file_name,
            request.file_size,
            &request.content_type,
            request.logical_type,
        )?;

        let upload_mode = if request.upload_mode == Some(UploadMode::Server)
            || request.file_size > self.config.direct_size_limit_bytes
        {
            UploadMode::Server
        } else {
            UploadMode::Direct
        };

        if upload_mode == UploadMode::Server
            && request.file_size > self.config.server_size_limit_bytes
        {
            return Err(AppError::InvalidInput(format!(
                "File size {} exceeds the server upload limit of {} bytes",
                request.file_size, self.config.server_size_limit_bytes
            )));
        }

        let ttl = request.ttl.unwrap_or(self.config.default_ttl_secs);
        let category = request
            .category
            .clone()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let now = Utc::now();
        let backend_key = build_object_key(
            request.logical_type,
            &category,
            owner_id,
            &request.file_name,
            now,
        );
        let content_type = request.content_type.to_lowercase();

        let presigned_url = match upload_mode {
            UploadMode::Direct => Some(
                self.presign(&backend_key, Duration::from_secs(ttl), &content_type)
                    .await?,
            ),
            UploadMode::Server => None,
        };

        let session = UploadSession {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            file_name: request.file_name,
            declared_size: request.file_size,
            declared_content_type: content_type,
            logical_file_type: request.logical_type,
            category,
            backend_key,
            presigned_url,
            upload_mode,
            part_size: self.config.chunk_size_bytes,
            status: UploadStatus::Pending,
            retry_count: 0,
            last_error: None,
            failed_parts: Vec::new(),
            finalized: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl as i64),
        };

        let registry_ttl = Duration::from_secs(ttl.max(self.config.session_ttl_secs));
        self.sessions
            .put(&session_key(&session.id), session.clone(), registry_ttl)
            .await?;

        tracing::info!(
            session_id = %session.id,
            key = %session.backend_key,
            upload_mode = ?session.upload_mode,
            "Upload session created"
        );

        let chunked = upload_mode == UploadMode::Server;
        Ok(InitiateUploadResponse {
            session_id: session.id,
            upload_url: session.presigned_url.clone(),
            key: session.backend_key.clone(),
            ttl,
            upload_mode,
            part_size: chunked.then_some(session.part_size),
            total_parts: chunked.then(|| session.total_parts()),
            expires_at: session.expires_at,
        })
    }

    async fn presign(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> Result<String, AppError> {
        let storage = &self.storage;
        retry_with(
            &self.presign_policy,
            move |_| storage.signed_upload_url(key, expires_in, Some(content_type)),
            |e: &StorageError| e.is_retryable(),
            |attempt, e| {
                tracing::warn!(attempt = attempt, key = %key, error = %e, "Presigning failed, retrying");
            },
        )
        .await
        .map_err(app_error_from_storage)
    }

    /// Verify the object landed, finalize the session and hand the record to the sink
    #[tracing::instrument(skip(self, request), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn confirm(
        &self,
        session_id: Uuid,
        owner_id: &str,
        request: ConfirmUploadRequest,
    ) -> Result<FinalizedFile, AppError> {
        let (key, mut session) = self.load_owned(session_id, owner_id).await?;

        if session.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Upload session is already {}",
                session.status
            )));
        }

        let info = match self.storage.head(&session.backend_key).await {
            Ok(info) => info,
            Err(StorageError::NotFound(_)) => {
                // A cancel that won the race has already removed the object
                let (_, current) = self.load_owned(session_id, owner_id).await?;
                Self::ensure_active(&current)?;
                self.note_error(&key, "upload not complete", None).await;
                return Err(AppError::UploadIncomplete(
                    "upload not complete".to_string(),
                ));
            }
            Err(e) => {
                self.note_error(&key, &e.to_string(), None).await;
                return Err(app_error_from_storage(e));
            }
        };

        let reported = request.actual_size.unwrap_or(session.declared_size);
        if reported.abs_diff(info.size) > self.config.size_mismatch_tolerance_bytes {
            tracing::warn!(
                key = %session.backend_key,
                reported_size = reported,
                stored_size = info.size,
                "Uploaded object size differs from the reported size"
            );
        }

        if session.status == UploadStatus::Pending {
            session = self
                .transition(&key, &session, UploadStatus::Uploading)
                .await?;
        }

        let file = FinalizedFile {
            session_id: session.id,
            owner_id: session.owner_id.clone(),
            key: session.backend_key.clone(),
            url: self.storage.public_url(&session.backend_key),
            file_name: session.file_name.clone(),
            content_type: info
                .content_type
                .unwrap_or_else(|| session.declared_content_type.clone()),
            size: info.size,
            logical_type: session.logical_file_type,
            category: session.category.clone(),
            completed_at: Utc::now(),
        };

        let mut completed = session.with_status(UploadStatus::Completed);
        completed.last_error = None;
        completed.finalized = Some(file.clone());
        self.swap(&key, &session, completed).await?;

        self.sink.record(&file).await.map_err(|e| {
            tracing::error!(key = %file.key, error = %e, "Failed to record finalized upload");
            AppError::Internal(format!("Failed to record finalized upload: {}", e))
        })?;

        tracing::info!(key = %file.key, size_bytes = file.size, "Upload confirmed");
        Ok(file)
    }

    /// Cancel a non-terminal session and remove whatever was already stored
    #[tracing::instrument(skip(self), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn cancel(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<CancelUploadResponse, AppError> {
        let (key, session) = self.load_owned(session_id, owner_id).await?;

        if session.status == UploadStatus::Completed {
            return Err(AppError::Conflict(
                "Upload already completed and cannot be cancelled".to_string(),
            ));
        }

        let cancelled = self
            .transition(&key, &session, UploadStatus::Cancelled)
            .await?;

        // Cleanup failures never fail the cancellation
        if let Err(e) = self.storage.delete(&session.backend_key).await {
            tracing::warn!(key = %session.backend_key, error = %e, "Failed to delete cancelled upload");
        }
        if session.upload_mode == UploadMode::Server {
            self.delete_parts(&session).await;
        }

        tracing::info!(key = %session.backend_key, "Upload session cancelled");
        Ok(CancelUploadResponse {
            session_id: cancelled.id,
            status: cancelled.status,
        })
    }

    /// Coarse progress: the object is either visible in storage or it is not
    #[tracing::instrument(skip(self), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn progress(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<UploadProgressResponse, AppError> {
        let (_, session) = self.load_owned(session_id, owner_id).await?;

        let percentage = match session.status {
            UploadStatus::Completed => 100,
            UploadStatus::Cancelled | UploadStatus::Failed => 0,
            UploadStatus::Pending | UploadStatus::Uploading => {
                let stored = match session.upload_mode {
                    UploadMode::Direct => self.stored_size(&session.backend_key).await?,
                    UploadMode::Server => self
                        .list_parts(&session)
                        .await?
                        .iter()
                        .map(|(_, size)| size)
                        .sum(),
                };
                percentage_of(stored, session.declared_size)
            }
        };

        Ok(UploadProgressResponse {
            status: session.status,
            percentage,
        })
    }

    /// Reset a session to pending so the client can upload again, within the retry budget.
    /// Direct sessions get a fresh upload URL valid until the session expires; server-relay
    /// sessions keep the parts already stored.
    #[tracing::instrument(skip(self), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn retry(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<RetryUploadResponse, AppError> {
        let (key, session) = self.load_owned(session_id, owner_id).await?;

        if !session.status.can_retry() {
            return Err(AppError::Conflict(format!(
                "Upload session is already {}",
                session.status
            )));
        }
        if session.retry_count >= self.config.max_retries {
            return Err(AppError::Conflict(format!(
                "Upload session reached the maximum of {} retries",
                self.config.max_retries
            )));
        }

        let remaining = (session.expires_at - Utc::now()).num_seconds();
        if remaining <= 0 {
            return Err(AppError::SessionExpired(
                "Upload session expired and cannot be retried".to_string(),
            ));
        }

        let mut reset = session.with_status(UploadStatus::Pending);
        reset.retry_count += 1;
        reset.last_error = None;
        reset.failed_parts.clear();
        if session.upload_mode == UploadMode::Direct {
            reset.presigned_url = Some(
                self.presign(
                    &session.backend_key,
                    Duration::from_secs(remaining as u64),
                    &session.declared_content_type,
                )
                .await?,
            );
        }

        let reset = self.swap(&key, &session, reset).await?;
        tracing::info!(retry_count = reset.retry_count, "Upload session reset for retry");

        let chunked = reset.upload_mode == UploadMode::Server;
        Ok(RetryUploadResponse {
            session_id: reset.id,
            upload_mode: reset.upload_mode,
            upload_url: reset.presigned_url.clone(),
            part_size: chunked.then_some(reset.part_size),
            total_parts: chunked.then(|| reset.total_parts()),
            retry_count: reset.retry_count,
            expires_at: reset.expires_at,
        })
    }

    /// Everything known about a session: progress, part bookkeeping, last error, whether it
    /// can still be resumed and a time estimate
    #[tracing::instrument(skip(self), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn detail(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<UploadSessionDetail, AppError> {
        let progress = self.progress(session_id, owner_id).await?;
        let (_, session) = self.load_owned(session_id, owner_id).await?;

        let parts = match session.upload_mode {
            UploadMode::Server if session.status.can_retry() => {
                let uploaded_parts: Vec<u32> = self
                    .list_parts(&session)
                    .await?
                    .into_iter()
                    .map(|(index, _)| index)
                    .collect();
                let failed_parts: Vec<u32> = session
                    .failed_parts
                    .iter()
                    .copied()
                    .filter(|index| uploaded_parts.binary_search(index).is_err())
                    .collect();
                let total_parts = session.total_parts();
                Some(PartsDetail {
                    part_size: session.part_size,
                    total_parts,
                    uploaded: uploaded_parts.len() as u32,
                    failed: failed_parts.len() as u32,
                    remaining: total_parts.saturating_sub(uploaded_parts.len() as u32),
                    uploaded_parts,
                    failed_parts,
                })
            }
            UploadMode::Server => {
                let total_parts = session.total_parts();
                let done = session.status == UploadStatus::Completed;
                Some(PartsDetail {
                    part_size: session.part_size,
                    total_parts,
                    uploaded: if done { total_parts } else { 0 },
                    failed: 0,
                    remaining: if done { 0 } else { total_parts },
                    uploaded_parts: Vec::new(),
                    failed_parts: Vec::new(),
                })
            }
            UploadMode::Direct => None,
        };

        let now = Utc::now();
        Ok(UploadSessionDetail {
            session_id: session.id,
            status: progress.status,
            percentage: progress.percentage,
            file_name: session.file_name.clone(),
            file_size: session.declared_size,
            logical_type: session.logical_file_type,
            upload_mode: session.upload_mode,
            retry_count: session.retry_count,
            last_error: session.last_error.clone(),
            parts,
            can_resume: session.status.can_retry() && !session.is_expired_at(now),
            estimated_seconds_remaining: estimate_remaining(
                (now - session.created_at).to_std().unwrap_or_default(),
                progress.percentage,
            ),
            file: session.finalized.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
    }

    async fn stored_size(&self, key: &str) -> Result<u64, AppError> {
        match self.storage.head(key).await {
            Ok(info) => Ok(info.size),
            Err(StorageError::NotFound(_)) => Ok(0),
            Err(e) => Err(app_error_from_storage(e)),
        }
    }

    /// Store one part of a server-relay upload
    #[tracing::instrument(skip(self, data), fields(session_id = %session_id, owner_id = %owner_id, index = index, size_bytes = data.len()))]
    pub async fn upload_part(
        &self,
        session_id: Uuid,
        owner_id: &str,
        index: u32,
        data: Bytes,
    ) -> Result<PartUploadResponse, AppError> {
        let (key, session) = self.load_owned(session_id, owner_id).await?;
        Self::ensure_server_mode(&session)?;
        Self::ensure_active(&session)?;

        let total_parts = session.total_parts();
        if index >= total_parts {
            return Err(AppError::InvalidInput(format!(
                "Part index {} out of range (total parts: {})",
                index, total_parts
            )));
        }

        let expected = part_range(index, session.declared_size, session.part_size);
        let expected_len = expected.end - expected.start;
        if data.len() as u64 != expected_len {
            return Err(AppError::InvalidInput(format!(
                "Part {} must be {} bytes, got {}",
                index,
                expected_len,
                data.len()
            )));
        }

        let stored_key = part_key(&session.backend_key, index);
        if let Err(e) = self
            .storage
            .put_with_key(&stored_key, data, PART_CONTENT_TYPE)
            .await
        {
            self.note_error(&key, &format!("part {}: {}", index, e), Some(index))
                .await;
            return Err(app_error_from_storage(e));
        }

        if session.status == UploadStatus::Pending {
            let uploading = session.with_status(UploadStatus::Uploading);
            self.sessions
                .compare_and_set(&key, UploadStatus::Pending, uploading)
                .await?;
        }

        // A cancel or confirm may have finished while the part was being written
        match self.sessions.get(&key).await? {
            Some(current) if current.status.is_terminal() => {
                self.discard_part(&stored_key).await;
                return Err(AppError::Conflict(format!(
                    "Upload session is already {}",
                    current.status
                )));
            }
            None => {
                self.discard_part(&stored_key).await;
                return Err(AppError::NotFound("Upload session not found".to_string()));
            }
            Some(current) if current.failed_parts.contains(&index) => {
                self.amend(&key, |s| s.failed_parts.retain(|&i| i != index))
                    .await;
            }
            Some(_) => {}
        }

        let uploaded_parts = self.list_parts(&session).await?.len();
        Ok(PartUploadResponse {
            index,
            uploaded_parts,
            total_parts,
        })
    }

    /// Part indices already stored, for resuming a server-relay upload
    #[tracing::instrument(skip(self), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn uploaded_parts(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<UploadedPartsResponse, AppError> {
        let (_, session) = self.load_owned(session_id, owner_id).await?;
        Self::ensure_server_mode(&session)?;

        let uploaded_parts = self
            .list_parts(&session)
            .await?
            .into_iter()
            .map(|(index, _)| index)
            .collect();

        Ok(UploadedPartsResponse {
            part_size: session.part_size,
            total_parts: session.total_parts(),
            uploaded_parts,
        })
    }

    /// Assemble the stored parts into the final object
    #[tracing::instrument(skip(self), fields(session_id = %session_id, owner_id = %owner_id))]
    pub async fn complete_parts(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<CompletePartsResponse, AppError> {
        let (_, session) = self.load_owned(session_id, owner_id).await?;
        Self::ensure_server_mode(&session)?;
        Self::ensure_active(&session)?;

        let total_parts = session.total_parts();
        let stored: Vec<u32> = self
            .list_parts(&session)
            .await?
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        let missing: Vec<u32> = (0..total_parts)
            .filter(|index| stored.binary_search(index).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::UploadIncomplete(format!(
                "{} of {} parts missing (first missing: {})",
                missing.len(),
                total_parts,
                missing[0]
            )));
        }

        let started = std::time::Instant::now();
        let mut assembled = BytesMut::with_capacity(session.declared_size as usize);
        for index in 0..total_parts {
            let part = self
                .storage
                .get(&part_key(&session.backend_key, index))
                .await
                .map_err(app_error_from_storage)?;
            assembled.extend_from_slice(&part);
        }

        let size = assembled.len() as u64;
        self.storage
            .put_with_key(
                &session.backend_key,
                assembled.freeze(),
                &session.declared_content_type,
            )
            .await
            .map_err(app_error_from_storage)?;

        self.delete_parts(&session).await;

        tracing::info!(
            key = %session.backend_key,
            size_bytes = size,
            parts = total_parts,
            duration_ms = started.elapsed().as_millis() as u64,
            "Assembled upload parts"
        );

        Ok(CompletePartsResponse {
            key: session.backend_key,
            size,
        })
    }

    /// Write an object through a signed relay URL
    #[tracing::instrument(skip(self, signature, data), fields(key = %key, size_bytes = data.len()))]
    pub async fn relay_put(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, AppError> {
        let signer = self
            .relay_signer
            .as_ref()
            .ok_or_else(|| AppError::Forbidden("Relay uploads are not enabled".to_string()))?;

        signer
            .verify("PUT", key, expires, signature, Utc::now().timestamp())
            .map_err(|e| AppError::Forbidden(e.to_string()))?;

        self.storage
            .put_with_key(key, data, content_type)
            .await
            .map_err(app_error_from_storage)
    }

    /// Drop expired registry entries
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let removed = self.sessions.purge_expired().await?;
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired upload sessions");
        }
        Ok(removed)
    }

    async fn load_owned(
        &self,
        session_id: Uuid,
        owner_id: &str,
    ) -> Result<(String, UploadSession), AppError> {
        let key = session_key(&session_id);
        let session = self
            .sessions
            .get(&key)
            .await?
            .ok_or_else(|| AppError::NotFound("Upload session not found".to_string()))?;

        if session.owner_id != owner_id {
            return Err(AppError::Forbidden(
                "Upload session belongs to another user".to_string(),
            ));
        }

        if session.is_expired() {
            return Err(AppError::SessionExpired(format!(
                "Upload session expired at {}",
                session.expires_at.to_rfc3339()
            )));
        }

        Ok((key, session))
    }

    async fn transition(
        &self,
        key: &str,
        session: &UploadSession,
        next: UploadStatus,
    ) -> Result<UploadSession, AppError> {
        if !session.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Upload session cannot move from {} to {}",
                session.status, next
            )));
        }

        self.swap(key, session, session.with_status(next)).await
    }

    /// Store `updated` only if the session still has the status it was read with
    async fn swap(
        &self,
        key: &str,
        session: &UploadSession,
        updated: UploadSession,
    ) -> Result<UploadSession, AppError> {
        if !self
            .sessions
            .compare_and_set(key, session.status, updated.clone())
            .await?
        {
            return Err(AppError::Conflict(
                "Upload session was modified concurrently".to_string(),
            ));
        }

        tracing::debug!(from = %session.status, to = %updated.status, "Upload session updated");
        Ok(updated)
    }

    /// Apply `update` to the current entry without changing its status. Bookkeeping only:
    /// concurrent amendments may overwrite each other and failures are logged, not returned.
    async fn amend(&self, key: &str, update: impl FnOnce(&mut UploadSession)) {
        let current = match self.sessions.get(key).await {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read upload session for update");
                return;
            }
        };
        let mut updated = current.clone();
        update(&mut updated);
        if let Err(e) = self
            .sessions
            .compare_and_set(key, current.status, updated)
            .await
        {
            tracing::warn!(error = %e, "Failed to update upload session");
        }
    }

    /// Remember the latest failure, and the part it hit if any
    async fn note_error(&self, key: &str, message: &str, part: Option<u32>) {
        let message = message.to_string();
        self.amend(key, move |session| {
            session.last_error = Some(message);
            if let Some(index) = part {
                if !session.failed_parts.contains(&index) {
                    session.failed_parts.push(index);
                    session.failed_parts.sort_unstable();
                }
            }
        })
        .await;
    }

    async fn discard_part(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to delete orphaned part");
        }
    }

    fn ensure_server_mode(session: &UploadSession) -> Result<(), AppError> {
        if session.upload_mode != UploadMode::Server {
            return Err(AppError::BadRequest(
                "Upload session is not in server upload mode".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_active(session: &UploadSession) -> Result<(), AppError> {
        if session.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Upload session is already {}",
                session.status
            )));
        }
        Ok(())
    }

    /// Stored parts as (index, size), sorted by index
    async fn list_parts(&self, session: &UploadSession) -> Result<Vec<(u32, u64)>, AppError> {
        let prefix = parts_prefix(&session.backend_key);
        let total_parts = session.total_parts();
        let objects = self
            .storage
            .list(Some(&prefix), total_parts as usize + 1)
            .await
            .map_err(app_error_from_storage)?;

        let mut parts: Vec<(u32, u64)> = objects
            .into_iter()
            .filter_map(|object| {
                let index = object.key.strip_prefix(&prefix)?.parse::<u32>().ok()?;
                (index < total_parts).then_some((index, object.size))
            })
            .collect();
        parts.sort_unstable_by_key(|(index, _)| *index);
        parts.dedup_by_key(|(index, _)| *index);
        Ok(parts)
    }

    async fn delete_parts(&self, session: &UploadSession) {
        let keys: Vec<String> = (0..session.total_parts())
            .map(|index| part_key(&session.backend_key, index))
            .collect();
        if let Err(e) = self.storage.delete_many(&keys).await {
            tracing::warn!(key = %session.backend_key, error = %e, "Failed to delete upload parts");
        }
    }
}

/// Remaining seconds, assuming the rest goes as fast as the part already done
fn estimate_remaining(elapsed: Duration, percentage: u8) -> Option<u64> {
    if percentage == 0 || percentage >= 100 {
        return None;
    }
    let elapsed = elapsed.as_secs_f64();
    let total = elapsed * 100.0 / f64::from(percentage);
    Some((total - elapsed).max(0.0).round() as u64)
}

fn percentage_of(stored: u64, declared: u64) -> u8 {
    if declared == 0 {
        return 0;
    }
    (stored.saturating_mul(100) / declared).min(100) as u8
}
