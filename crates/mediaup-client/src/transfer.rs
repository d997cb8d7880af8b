//! Single-file transfer controller
//!
//! A transfer moves through `pending → preparing → uploading ⇄ paused → processing →
//! completed`. Any non-terminal state can fail; a failed transfer can be retried, which
//! reuses the server session and the part bookkeeping it already has. Cancellation is
//! terminal.
//!
//! Payloads larger than the chunk size are sent in server mode: the server is asked which
//! parts it already holds, the rest are uploaded through a bounded window, then the server
//! assembles them. Smaller payloads are PUT whole to the presigned URL. Each network call
//! runs under the retry policy and under a cancellation token; pausing cancels the token,
//! resuming installs a fresh one.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use mediaup_core::models::{
    FinalizedFile, InitiateUploadRequest, InitiateUploadResponse, LogicalFileType, UploadMode,
    UploadStatus,
};
use mediaup_core::validation::{part_count, part_range};
use mediaup_core::{retry_with, RetryPolicy, Retryable};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TransferError;
use crate::progress::{SpeedMeter, TransferProgress};
use crate::transport::{ByteCounter, UploadTransport};
use crate::until_cancelled;

/// Default part size for chunked transfers (5 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
/// Default number of parts in flight per transfer
pub const DEFAULT_PART_CONCURRENCY: usize = 5;
pub const DEFAULT_SPEED_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Preparing,
    Uploading,
    Paused,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }

    /// Work is in progress for this transfer
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TransferStatus::Preparing | TransferStatus::Uploading | TransferStatus::Processing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Preparing => "preparing",
            TransferStatus::Uploading => "uploading",
            TransferStatus::Paused => "paused",
            TransferStatus::Processing => "processing",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes to transfer plus the metadata the server validates
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Payload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Transforms a payload before upload (compression, transcoding, stripping metadata).
/// Size accounting uses the processed payload.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    async fn process(&self, payload: Payload) -> Result<Payload, TransferError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub index: u32,
    pub range: Range<u64>,
    pub uploaded: bool,
}

impl Part {
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-size parts covering `[0, size)`; the last one may be shorter.
pub fn plan_parts(size: u64, part_size: u64) -> Vec<Part> {
    (0..part_count(size, part_size))
        .map(|index| Part {
            index,
            range: part_range(index, size, part_size),
            uploaded: false,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub logical_type: LogicalFileType,
    pub category: Option<String>,
    /// Session lifetime requested from the server, in seconds
    pub ttl: Option<u64>,
    pub chunk_size: u64,
    pub part_concurrency: usize,
    /// Split payloads larger than `chunk_size` into resumable parts
    pub resumable: bool,
    pub retry: RetryPolicy,
    pub speed_window: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self::new(LogicalFileType::Other)
    }
}

impl TransferConfig {
    pub fn new(logical_type: LogicalFileType) -> Self {
        Self {
            logical_type,
            category: None,
            ttl: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            resumable: true,
            retry: RetryPolicy::upload(),
            speed_window: DEFAULT_SPEED_WINDOW,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_part_concurrency(mut self, part_concurrency: usize) -> Self {
        self.part_concurrency = part_concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Observable state of one transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSnapshot {
    pub file_name: String,
    pub status: TransferStatus,
    pub progress: TransferProgress,
    /// Retries performed so far, across all calls of this transfer
    pub retry_attempt: u32,
    pub error: Option<String>,
    pub session_id: Option<Uuid>,
    /// Empty for whole-object transfers
    pub parts: Vec<Part>,
}

#[derive(Debug, Default)]
struct RunState {
    payload: Option<Payload>,
    session: Option<InitiateUploadResponse>,
    last_error_code: Option<String>,
}

/// State shared with byte counters handed to the transport
struct Shared {
    state: watch::Sender<TransferSnapshot>,
    meter: Mutex<SpeedMeter>,
}

impl Shared {
    fn snapshot(&self) -> TransferSnapshot {
        self.state.borrow().clone()
    }

    fn status(&self) -> TransferStatus {
        self.state.borrow().status
    }

    fn update(&self, modify: impl FnOnce(&mut TransferSnapshot)) {
        self.state.send_modify(modify);
    }

    /// Move to `to` if the current status is one of `from`
    fn transition(&self, from: &[TransferStatus], to: TransferStatus) -> bool {
        self.state.send_if_modified(|snapshot| {
            if from.contains(&snapshot.status) {
                snapshot.status = to;
                true
            } else {
                false
            }
        })
    }

    fn record_loaded(&self, next: impl FnOnce(u64) -> u64) {
        self.state.send_modify(|snapshot| {
            let loaded = next(snapshot.progress.loaded);
            let speed = lock(&self.meter).record(Instant::now(), loaded);
            snapshot.progress = TransferProgress::new(loaded, snapshot.progress.total, speed);
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TransferController {
    transport: Arc<dyn UploadTransport>,
    source: Payload,
    config: TransferConfig,
    preprocessor: Option<Arc<dyn Preprocessor>>,
    run: Mutex<RunState>,
    token: Mutex<CancellationToken>,
    shared: Arc<Shared>,
}

impl TransferController {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        payload: Payload,
        config: TransferConfig,
    ) -> Self {
        let (state, _) = watch::channel(TransferSnapshot {
            file_name: payload.file_name.clone(),
            status: TransferStatus::Pending,
            progress: TransferProgress::empty(payload.size()),
            retry_attempt: 0,
            error: None,
            session_id: None,
            parts: Vec::new(),
        });
        let meter = Mutex::new(SpeedMeter::new(config.speed_window));

        Self {
            transport,
            source: payload,
            config,
            preprocessor: None,
            run: Mutex::new(RunState::default()),
            token: Mutex::new(CancellationToken::new()),
            shared: Arc::new(Shared { state, meter }),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn file_name(&self) -> &str {
        &self.source.file_name
    }

    pub fn status(&self) -> TransferStatus {
        self.shared.status()
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        self.shared.snapshot()
    }

    /// Receiver that observes every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<TransferSnapshot> {
        self.shared.state.subscribe()
    }

    /// Run a pending transfer to completion.
    ///
    /// Returns `TransferError::Paused` when paused mid-flight and `TransferError::Cancelled`
    /// when cancelled; both leave the transfer in that state.
    pub async fn start(&self) -> Result<FinalizedFile, TransferError> {
        if !self
            .shared
            .transition(&[TransferStatus::Pending], TransferStatus::Preparing)
        {
            return Err(self.refused("start"));
        }
        tracing::info!(file_name = %self.source.file_name, "Transfer started");
        self.drive().await
    }

    /// Abort in-flight calls and keep the bookkeeping. Only an uploading transfer pauses.
    pub fn pause(&self) -> bool {
        if !self
            .shared
            .transition(&[TransferStatus::Uploading], TransferStatus::Paused)
        {
            return false;
        }
        lock(&self.token).cancel();
        tracing::info!(file_name = %self.source.file_name, "Transfer paused");
        true
    }

    /// Continue a paused transfer from where it stopped
    pub async fn resume(&self) -> Result<FinalizedFile, TransferError> {
        if !self
            .shared
            .transition(&[TransferStatus::Paused], TransferStatus::Uploading)
        {
            return Err(self.refused("resume"));
        }
        tracing::info!(file_name = %self.source.file_name, "Transfer resumed");
        self.drive().await
    }

    /// Send a failed transfer back through the pipeline
    pub async fn retry(&self) -> Result<FinalizedFile, TransferError> {
        if !self
            .shared
            .transition(&[TransferStatus::Failed], TransferStatus::Pending)
        {
            return Err(self.refused("retry"));
        }

        let session_lost = {
            let mut run = lock(&self.run);
            // A session the server no longer knows cannot be resumed
            let lost = matches!(
                run.last_error_code.as_deref(),
                Some("NOT_FOUND" | "SESSION_EXPIRED" | "CONFLICT")
            );
            if lost {
                run.session = None;
            }
            run.last_error_code = None;
            lost
        };
        self.shared.update(|snapshot| {
            snapshot.error = None;
            if session_lost {
                snapshot.session_id = None;
                snapshot.parts.clear();
            }
        });

        self.start().await
    }

    /// Stop for good. The server session is cancelled best-effort.
    pub async fn cancel(&self) -> bool {
        if !self.shared.transition(
            &[
                TransferStatus::Pending,
                TransferStatus::Preparing,
                TransferStatus::Uploading,
                TransferStatus::Paused,
                TransferStatus::Processing,
                TransferStatus::Failed,
            ],
            TransferStatus::Cancelled,
        ) {
            return false;
        }
        lock(&self.token).cancel();

        let session_id = lock(&self.run).session.as_ref().map(|s| s.session_id);
        if let Some(session_id) = session_id {
            if let Err(e) = self.transport.cancel(session_id).await {
                tracing::warn!(
                    file_name = %self.source.file_name,
                    session_id = %session_id,
                    error = %e,
                    "Failed to cancel upload session on server"
                );
            }
        }

        tracing::info!(file_name = %self.source.file_name, "Transfer cancelled");
        true
    }

    fn refused(&self, action: &str) -> TransferError {
        TransferError::InvalidState(format!(
            "cannot {} a {} transfer",
            action,
            self.status()
        ))
    }

    /// Error reported when the status moved under a running transfer
    fn interruption(&self) -> TransferError {
        match self.status() {
            TransferStatus::Paused => TransferError::Paused,
            TransferStatus::Cancelled => TransferError::Cancelled,
            other => TransferError::InvalidState(format!("unexpected {} transfer", other)),
        }
    }

    fn enter(&self, from: &[TransferStatus], to: TransferStatus) -> Result<(), TransferError> {
        if self.shared.transition(from, to) {
            Ok(())
        } else {
            Err(self.interruption())
        }
    }

    async fn drive(&self) -> Result<FinalizedFile, TransferError> {
        let token = CancellationToken::new();
        *lock(&self.token) = token.clone();
        lock(&self.shared.meter).reset();

        let outcome = self.execute(&token).await;

        match outcome {
            Ok(file) => {
                if !self
                    .shared
                    .transition(&[TransferStatus::Processing], TransferStatus::Completed)
                {
                    return Err(self.interruption());
                }
                self.shared.update(|snapshot| {
                    snapshot.progress = TransferProgress::finished(snapshot.progress.total);
                    snapshot.error = None;
                });
                tracing::info!(
                    file_name = %self.source.file_name,
                    key = %file.key,
                    size_bytes = file.size,
                    "Transfer completed"
                );
                Ok(file)
            }
            Err(err) => match self.status() {
                TransferStatus::Paused => Err(TransferError::Paused),
                TransferStatus::Cancelled => Err(TransferError::Cancelled),
                _ => {
                    lock(&self.run).last_error_code = err.code().map(str::to_string);
                    let message = err.to_string();
                    self.shared.update(|snapshot| {
                        snapshot.status = TransferStatus::Failed;
                        snapshot.error = Some(message);
                    });
                    tracing::warn!(
                        file_name = %self.source.file_name,
                        error = %err,
                        "Transfer failed"
                    );
                    Err(err)
                }
            },
        }
    }

    async fn execute(&self, token: &CancellationToken) -> Result<FinalizedFile, TransferError> {
        let payload = self.prepare(token).await?;
        let session = self.ensure_session(&payload, token).await?;
        self.enter(
            &[TransferStatus::Preparing, TransferStatus::Uploading],
            TransferStatus::Uploading,
        )?;

        match session.upload_mode {
            UploadMode::Server => {
                self.upload_parts(&payload, &session, token).await?;
                self.enter(&[TransferStatus::Uploading], TransferStatus::Processing)?;
                let assembled = self
                    .with_retry(token, |_| {
                        self.transport.complete_parts(session.session_id, token)
                    })
                    .await?;
                tracing::debug!(
                    key = %assembled.key,
                    size_bytes = assembled.size,
                    "Parts assembled"
                );
            }
            UploadMode::Direct => {
                self.put_whole(&payload, &session, token).await?;
                self.enter(&[TransferStatus::Uploading], TransferStatus::Processing)?;
            }
        }

        self.confirm(session.session_id, payload.size(), token)
            .await
    }

    /// Confirm under the retry policy. A 409 may mean an earlier attempt went through and
    /// only its response was lost; the session detail tells which.
    async fn confirm(
        &self,
        session_id: Uuid,
        size: u64,
        token: &CancellationToken,
    ) -> Result<FinalizedFile, TransferError> {
        let outcome = self
            .with_retry(token, |_| {
                self.transport.confirm(session_id, Some(size), token)
            })
            .await;

        match outcome {
            Err(err) if err.status_code() == Some(409) => {
                let detail = self
                    .with_retry(token, |_| self.transport.detail(session_id, token))
                    .await?;
                match (detail.status, detail.file) {
                    (UploadStatus::Completed, Some(file)) => {
                        tracing::info!(
                            file_name = %self.source.file_name,
                            session_id = %session_id,
                            "Upload was already confirmed"
                        );
                        Ok(file)
                    }
                    _ => Err(err),
                }
            }
            other => other,
        }
    }

    async fn prepare(&self, token: &CancellationToken) -> Result<Payload, TransferError> {
        let cached = lock(&self.run).payload.clone();
        if let Some(payload) = cached {
            return Ok(payload);
        }

        let payload = match &self.preprocessor {
            Some(preprocessor) => {
                until_cancelled(token, preprocessor.process(self.source.clone())).await?
            }
            None => self.source.clone(),
        };

        let total = payload.size();
        self.shared.update(|snapshot| {
            snapshot.progress = TransferProgress::empty(total);
        });
        lock(&self.run).payload = Some(payload.clone());
        Ok(payload)
    }

    async fn ensure_session(
        &self,
        payload: &Payload,
        token: &CancellationToken,
    ) -> Result<InitiateUploadResponse, TransferError> {
        let cached = lock(&self.run).session.clone();
        if let Some(session) = cached {
            return Ok(session);
        }

        let chunked = self.config.resumable && payload.size() > self.config.chunk_size;
        let request = InitiateUploadRequest {
            file_name: payload.file_name.clone(),
            file_size: payload.size(),
            content_type: payload.content_type.clone(),
            logical_type: self.config.logical_type,
            category: self.config.category.clone(),
            ttl: self.config.ttl,
            upload_mode: chunked.then_some(UploadMode::Server),
        };

        let session = self
            .with_retry(token, |_| self.transport.initiate(&request, token))
            .await?;

        tracing::debug!(
            file_name = %payload.file_name,
            session_id = %session.session_id,
            upload_mode = ?session.upload_mode,
            "Upload session initiated"
        );
        self.shared
            .update(|snapshot| snapshot.session_id = Some(session.session_id));
        lock(&self.run).session = Some(session.clone());
        Ok(session)
    }

    async fn upload_parts(
        &self,
        payload: &Payload,
        session: &InitiateUploadResponse,
        token: &CancellationToken,
    ) -> Result<(), TransferError> {
        let session_id = session.session_id;
        let part_size = session.part_size.unwrap_or(self.config.chunk_size);

        if self.shared.snapshot().parts.is_empty() {
            let planned = plan_parts(payload.size(), part_size);
            self.shared.update(|snapshot| snapshot.parts = planned);
        }

        let listed = self
            .with_retry(token, |_| self.transport.uploaded_parts(session_id, token))
            .await?;
        let on_server: HashSet<u32> = listed.uploaded_parts.into_iter().collect();

        // The server listing is authoritative in both directions
        self.shared.update(|snapshot| {
            for part in snapshot.parts.iter_mut() {
                part.uploaded = on_server.contains(&part.index);
            }
        });

        let parts = self.shared.snapshot().parts;
        let done: u64 = parts.iter().filter(|p| p.uploaded).map(Part::len).sum();
        let remaining: Vec<Part> = parts.into_iter().filter(|p| !p.uploaded).collect();
        self.shared.record_loaded(|_| done);

        tracing::debug!(
            session_id = %session_id,
            skipped = on_server.len(),
            remaining = remaining.len(),
            "Uploading parts"
        );

        let mut uploads = stream::iter(remaining)
            .map(|part| {
                let data = payload
                    .data
                    .slice(part.range.start as usize..part.range.end as usize);
                async move {
                    self.with_retry(token, |_| {
                        self.transport
                            .upload_part(session_id, part.index, data.clone(), token)
                    })
                    .await
                    .map(|_| part)
                }
            })
            .buffer_unordered(self.config.part_concurrency.max(1));

        while let Some(result) = uploads.next().await {
            let part = result?;
            self.shared.update(|snapshot| {
                if let Some(entry) = snapshot.parts.iter_mut().find(|p| p.index == part.index) {
                    entry.uploaded = true;
                }
            });
            self.shared.record_loaded(|loaded| loaded + part.len());
        }

        Ok(())
    }

    async fn put_whole(
        &self,
        payload: &Payload,
        session: &InitiateUploadResponse,
        token: &CancellationToken,
    ) -> Result<(), TransferError> {
        let url = session.upload_url.clone().ok_or_else(|| {
            TransferError::Decode("direct upload session without an upload URL".to_string())
        })?;

        self.with_retry(token, |_| {
            // Every attempt re-sends the whole object
            self.shared.record_loaded(|_| 0);
            let shared = Arc::clone(&self.shared);
            let on_bytes: ByteCounter =
                Arc::new(move |sent| shared.record_loaded(|loaded| loaded + sent));
            self.transport.put_object(
                &url,
                payload.data.clone(),
                &payload.content_type,
                on_bytes,
                token,
            )
        })
        .await
    }

    /// Run `operation` under the retry policy, abandoning it when `token` fires
    async fn with_retry<T, F, Fut>(
        &self,
        token: &CancellationToken,
        operation: F,
    ) -> Result<T, TransferError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let shared = &self.shared;
        let file_name = self.source.file_name.as_str();
        let attempts = retry_with(
            &self.config.retry,
            operation,
            |err: &TransferError| err.is_retryable(),
            |attempt, err| {
                shared.update(|snapshot| snapshot.retry_attempt += 1);
                tracing::warn!(
                    file_name = %file_name,
                    attempt = attempt,
                    error = %err,
                    "Transfer call failed, retrying"
                );
            },
        );
        until_cancelled(token, attempts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    const CHUNK: u64 = 5;

    fn config() -> TransferConfig {
        TransferConfig::new(LogicalFileType::Image)
            .with_chunk_size(CHUNK)
            .with_retry(
                RetryPolicy::fast()
                    .with_base_delay(Duration::from_millis(1))
                    .with_jitter(false),
            )
    }

    fn payload(data: &'static [u8]) -> Payload {
        Payload::new("photo.png", "image/png", Bytes::from_static(data))
    }

    fn controller(fake: &Arc<FakeTransport>, data: &'static [u8]) -> TransferController {
        TransferController::new(fake.clone(), payload(data), config())
    }

    #[test]
    fn parts_cover_the_payload() {
        let parts = plan_parts(12, 5);
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts.iter().map(Part::len).collect::<Vec<_>>(),
            vec![5, 5, 2]
        );
        assert_eq!(parts[2].range, 10..12);
        assert!(plan_parts(0, 5).is_empty());
        assert_eq!(plan_parts(10, 5).len(), 2);
    }

    #[tokio::test]
    async fn chunked_transfer_uploads_every_part_then_finalizes() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        let transfer = controller(&fake, b"abcdefghijkl");
        let updates = transfer.subscribe();

        let file = transfer.start().await.unwrap();
        assert_eq!(file.size, 12);
        assert_eq!(fake.stored(file.session_id), Some(Bytes::from_static(b"abcdefghijkl")));

        let snapshot = transfer.snapshot();
        assert_eq!(snapshot.status, TransferStatus::Completed);
        assert_eq!(snapshot.parts.len(), 3);
        assert!(snapshot.parts.iter().all(|p| p.uploaded));
        assert_eq!(snapshot.progress.percentage, 100);
        assert_eq!(updates.borrow().status, TransferStatus::Completed);

        let calls = fake.calls();
        let complete = calls.iter().position(|c| c == "complete").unwrap();
        let confirm = calls.iter().position(|c| c == "confirm").unwrap();
        assert!(complete < confirm);
        assert_eq!(fake.count("part:"), 3);
    }

    #[tokio::test]
    async fn parts_already_on_server_are_skipped() {
        let source = Bytes::from_static(b"abcdefghijkl");
        let fake = Arc::new(FakeTransport::new(CHUNK).with_preloaded(vec![0, 2], source));
        let transfer = controller(&fake, b"abcdefghijkl");

        let file = transfer.start().await.unwrap();
        assert_eq!(fake.calls_matching("part:"), vec!["part:1".to_string()]);
        assert_eq!(fake.stored(file.session_id), Some(Bytes::from_static(b"abcdefghijkl")));
    }

    #[tokio::test]
    async fn small_payload_is_put_whole() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        let transfer = controller(&fake, b"abcd");

        let file = transfer.start().await.unwrap();
        assert_eq!(fake.count("put"), 1);
        assert_eq!(fake.count("part:"), 0);
        assert_eq!(fake.stored(file.session_id), Some(Bytes::from_static(b"abcd")));

        let snapshot = transfer.snapshot();
        assert!(snapshot.parts.is_empty());
        assert_eq!(snapshot.progress.loaded, 4);
    }

    #[tokio::test]
    async fn retryable_part_failures_are_retried() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.fail_part(1, 2, 503);
        let transfer = controller(&fake, b"abcdefghijkl");

        transfer.start().await.unwrap();
        assert_eq!(fake.count("part:1"), 3);
        assert_eq!(transfer.snapshot().retry_attempt, 2);
    }

    #[tokio::test]
    async fn confirm_answered_after_commit_is_not_uploaded_twice() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.lose_confirm_response(1, 500);
        let transfer = controller(&fake, b"abcd");

        let file = transfer.start().await.unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(fake.count("confirm"), 2);
        assert_eq!(fake.count("detail"), 1);
        assert_eq!(fake.count("initiate"), 1);
        assert_eq!(fake.count("put"), 1);
        assert_eq!(file.file_name, "photo.png");
        assert_eq!(fake.stored(file.session_id), Some(Bytes::from_static(b"abcd")));
    }

    #[tokio::test]
    async fn chunked_confirm_conflict_resolves_from_session_detail() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.lose_confirm_response(1, 502);
        let transfer = controller(&fake, b"abcdefghijkl");

        let file = transfer.start().await.unwrap();
        assert_eq!(file.size, 12);
        assert_eq!(fake.count("complete"), 1);
        assert_eq!(fake.count("part:"), 3);
        assert_eq!(transfer.snapshot().retry_attempt, 1);
    }

    #[tokio::test]
    async fn client_errors_fail_and_retry_resumes() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.fail_part(1, 1, 400);
        let transfer = controller(&fake, b"abcdefghijkl");

        let err = transfer.start().await.unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(fake.count("part:1"), 1);

        let snapshot = transfer.snapshot();
        assert_eq!(snapshot.status, TransferStatus::Failed);
        assert!(snapshot.error.is_some());

        let file = transfer.retry().await.unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(fake.count("initiate"), 1);
        assert_eq!(fake.count("part:0"), 1);
        assert_eq!(fake.count("part:1"), 2);
        assert_eq!(fake.stored(file.session_id), Some(Bytes::from_static(b"abcdefghijkl")));
    }

    #[tokio::test]
    async fn pause_aborts_in_flight_parts_and_resume_finishes() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.hang_part(1);
        let transfer = Arc::new(controller(&fake, b"abcdefghijkl"));

        let running = tokio::spawn({
            let transfer = Arc::clone(&transfer);
            async move { transfer.start().await }
        });
        fake.wait_for_hang().await;

        assert!(transfer.pause());
        let outcome = running.await.unwrap();
        assert!(matches!(outcome, Err(TransferError::Paused)));
        assert_eq!(transfer.status(), TransferStatus::Paused);
        assert_eq!(transfer.snapshot().parts.len(), 3);
        assert!(!transfer.pause());

        let file = transfer.resume().await.unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert_eq!(fake.count("part:1"), 2);
        assert_eq!(fake.count("initiate"), 1);
        assert_eq!(fake.stored(file.session_id), Some(Bytes::from_static(b"abcdefghijkl")));
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_notifies_server() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.hang_part(1);
        let transfer = Arc::new(controller(&fake, b"abcdefghijkl"));

        let running = tokio::spawn({
            let transfer = Arc::clone(&transfer);
            async move { transfer.start().await }
        });
        fake.wait_for_hang().await;

        assert!(transfer.cancel().await);
        let outcome = running.await.unwrap();
        assert!(matches!(outcome, Err(TransferError::Cancelled)));
        assert_eq!(transfer.status(), TransferStatus::Cancelled);
        assert_eq!(fake.count("cancel"), 1);

        assert!(!transfer.cancel().await);
        assert!(matches!(
            transfer.resume().await,
            Err(TransferError::InvalidState(_))
        ));
        assert!(matches!(
            transfer.start().await,
            Err(TransferError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn server_cancel_failure_is_swallowed() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        fake.fail_cancel();
        fake.fail_part(0, 1, 400);
        let transfer = controller(&fake, b"abcdefghijkl");

        assert!(transfer.start().await.is_err());
        assert!(transfer.cancel().await);
        assert_eq!(transfer.status(), TransferStatus::Cancelled);
        assert_eq!(fake.count("cancel"), 1);
    }

    #[tokio::test]
    async fn cancelling_before_start_skips_server() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        let transfer = controller(&fake, b"abcd");

        assert!(transfer.cancel().await);
        assert_eq!(fake.count("cancel"), 0);
        assert_eq!(fake.count("initiate"), 0);
    }

    struct Truncate(usize);

    #[async_trait]
    impl Preprocessor for Truncate {
        async fn process(&self, payload: Payload) -> Result<Payload, TransferError> {
            Ok(Payload {
                data: payload.data.slice(..self.0),
                ..payload
            })
        }
    }

    #[tokio::test]
    async fn preprocessed_payload_drives_accounting() {
        let fake = Arc::new(FakeTransport::new(CHUNK));
        let transfer =
            controller(&fake, b"abcdefghijkl").with_preprocessor(Arc::new(Truncate(3)));

        let file = transfer.start().await.unwrap();
        assert_eq!(fake.declared_sizes(), vec![3]);
        assert_eq!(fake.count("put"), 1);
        assert_eq!(file.size, 3);
        assert_eq!(transfer.snapshot().progress.total, 3);
    }
}
