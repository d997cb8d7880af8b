//! In-memory `UploadTransport` for controller and batch tests

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use mediaup_core::models::{
    CancelUploadResponse, CompletePartsResponse, FinalizedFile, InitiateUploadRequest,
    InitiateUploadResponse, PartUploadResponse, UploadMode, UploadSessionDetail, UploadStatus,
    UploadedPartsResponse,
};
use mediaup_core::validation::{part_count, part_range};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TransferError;
use crate::transport::{ByteCounter, UploadTransport};
use crate::until_cancelled;

struct FakeSession {
    request: InitiateUploadRequest,
    parts: BTreeMap<u32, Bytes>,
    object: Option<Bytes>,
    confirmed: Option<FinalizedFile>,
}

#[derive(Default)]
struct Script {
    /// part index → (failures left, status)
    part_failures: HashMap<u32, (u32, u16)>,
    hang_part: Option<u32>,
    fail_cancel: bool,
    /// (failures left, status) for confirms that commit but lose their response
    lost_confirms: Option<(u32, u16)>,
    preloaded: Option<(Vec<u32>, Bytes)>,
}

pub(crate) struct FakeTransport {
    part_size: u64,
    delay: Duration,
    sessions: Mutex<HashMap<Uuid, FakeSession>>,
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
    declared_sizes: Mutex<Vec<u64>>,
    hang_started: Notify,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

fn http(status: u16, code: &str, message: &str) -> TransferError {
    TransferError::Http {
        status,
        code: Some(code.to_string()),
        message: message.to_string(),
    }
}

impl FakeTransport {
    pub fn new(part_size: u64) -> Self {
        Self {
            part_size,
            delay: Duration::ZERO,
            sessions: Mutex::new(HashMap::new()),
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
            declared_sizes: Mutex::new(Vec::new()),
            hang_started: Notify::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Every initiate and whole-object PUT takes at least `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// New sessions start with `parts` of `source` already stored
    pub fn with_preloaded(self, parts: Vec<u32>, source: Bytes) -> Self {
        self.script.lock().unwrap().preloaded = Some((parts, source));
        self
    }

    pub fn fail_part(&self, index: u32, times: u32, status: u16) {
        self.script
            .lock()
            .unwrap()
            .part_failures
            .insert(index, (times, status));
    }

    /// The first upload of part `index` blocks until its token is cancelled
    pub fn hang_part(&self, index: u32) {
        self.script.lock().unwrap().hang_part = Some(index);
    }

    /// The next `times` confirms succeed on the server but answer with `status`
    pub fn lose_confirm_response(&self, times: u32, status: u16) {
        self.script.lock().unwrap().lost_confirms = Some((times, status));
    }

    pub fn fail_cancel(&self) {
        self.script.lock().unwrap().fail_cancel = true;
    }

    pub async fn wait_for_hang(&self) {
        self.hang_started.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls_matching(prefix).len()
    }

    pub fn declared_sizes(&self) -> Vec<u64> {
        self.declared_sizes.lock().unwrap().clone()
    }

    /// Highest number of sessions that were initiated but not yet confirmed at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn stored(&self, session_id: Uuid) -> Option<Bytes> {
        self.sessions
            .lock()
            .unwrap()
            .get(&session_id)
            .and_then(|s| s.object.clone())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    async fn pause_for_delay(&self, cancel: &CancellationToken) -> Result<(), TransferError> {
        if self.delay.is_zero() {
            return Ok(());
        }
        until_cancelled(cancel, async {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UploadTransport for FakeTransport {
    async fn initiate(
        &self,
        request: &InitiateUploadRequest,
        cancel: &CancellationToken,
    ) -> Result<InitiateUploadResponse, TransferError> {
        self.record("initiate");
        self.declared_sizes.lock().unwrap().push(request.file_size);
        if request.file_name.starts_with("bad") {
            return Err(http(400, "INVALID_INPUT", "rejected file"));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.pause_for_delay(cancel).await?;

        let id = Uuid::new_v4();
        let mode = request.upload_mode.unwrap_or(UploadMode::Direct);
        let mut parts = BTreeMap::new();
        if mode == UploadMode::Server {
            if let Some((indices, source)) = &self.script.lock().unwrap().preloaded {
                for &index in indices {
                    let range = part_range(index, source.len() as u64, self.part_size);
                    parts.insert(index, source.slice(range.start as usize..range.end as usize));
                }
            }
        }

        self.sessions.lock().unwrap().insert(
            id,
            FakeSession {
                request: request.clone(),
                parts,
                object: None,
                confirmed: None,
            },
        );

        let server = mode == UploadMode::Server;
        Ok(InitiateUploadResponse {
            session_id: id,
            upload_url: (!server).then(|| format!("fake://{}", id)),
            key: format!("images/other/user-1/{}", request.file_name),
            ttl: 3600,
            upload_mode: mode,
            part_size: server.then_some(self.part_size),
            total_parts: server.then(|| part_count(request.file_size, self.part_size)),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }

    async fn put_object(
        &self,
        url: &str,
        data: Bytes,
        _content_type: &str,
        on_bytes: ByteCounter,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        self.record("put");
        self.pause_for_delay(cancel).await?;

        let id: Uuid = url
            .trim_start_matches("fake://")
            .parse()
            .map_err(|_| http(404, "NOT_FOUND", "unknown url"))?;
        on_bytes(data.len() as u64);

        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| http(404, "NOT_FOUND", "unknown session"))?;
        session.object = Some(data);
        Ok(())
    }

    async fn upload_part(
        &self,
        session_id: Uuid,
        index: u32,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<PartUploadResponse, TransferError> {
        self.record(format!("part:{}", index));

        let (hang, failure) = {
            let mut script = self.script.lock().unwrap();
            let hang = script.hang_part == Some(index);
            if hang {
                script.hang_part = None;
            }
            let failure = match script.part_failures.get_mut(&index) {
                Some((left, status)) if *left > 0 => {
                    *left -= 1;
                    Some(*status)
                }
                _ => None,
            };
            (hang, failure)
        };

        if hang {
            self.hang_started.notify_one();
            cancel.cancelled().await;
            return Err(TransferError::Aborted);
        }
        if let Some(status) = failure {
            return Err(http(status, "SCRIPTED", "scripted part failure"));
        }

        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| http(404, "NOT_FOUND", "unknown session"))?;
        session.parts.insert(index, data);
        Ok(PartUploadResponse {
            index,
            uploaded_parts: session.parts.len(),
            total_parts: part_count(session.request.file_size, self.part_size),
        })
    }

    async fn uploaded_parts(
        &self,
        session_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<UploadedPartsResponse, TransferError> {
        self.record("list");
        let sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get(&session_id)
            .ok_or_else(|| http(404, "NOT_FOUND", "unknown session"))?;
        Ok(UploadedPartsResponse {
            part_size: self.part_size,
            total_parts: part_count(session.request.file_size, self.part_size),
            uploaded_parts: session.parts.keys().copied().collect(),
        })
    }

    async fn complete_parts(
        &self,
        session_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<CompletePartsResponse, TransferError> {
        self.record("complete");
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| http(404, "NOT_FOUND", "unknown session"))?;

        let total = part_count(session.request.file_size, self.part_size);
        if (0..total).any(|index| !session.parts.contains_key(&index)) {
            return Err(http(400, "UPLOAD_NOT_COMPLETE", "parts missing"));
        }

        let mut object = BytesMut::new();
        for data in session.parts.values() {
            object.extend_from_slice(data);
        }
        let object = object.freeze();
        let size = object.len() as u64;
        session.object = Some(object);
        session.parts.clear();

        Ok(CompletePartsResponse {
            key: format!("images/other/user-1/{}", session.request.file_name),
            size,
        })
    }

    async fn confirm(
        &self,
        session_id: Uuid,
        _actual_size: Option<u64>,
        _cancel: &CancellationToken,
    ) -> Result<FinalizedFile, TransferError> {
        self.record("confirm");
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| http(404, "NOT_FOUND", "unknown session"))?;
        if session.confirmed.is_some() {
            return Err(http(409, "CONFLICT", "already confirmed"));
        }
        let object = session
            .object
            .clone()
            .ok_or_else(|| http(400, "UPLOAD_NOT_COMPLETE", "upload not complete"))?;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let file = FinalizedFile {
            session_id,
            owner_id: "user-1".to_string(),
            key: format!("images/other/user-1/{}", session.request.file_name),
            url: format!("fake://objects/{}", session.request.file_name),
            file_name: session.request.file_name.clone(),
            content_type: session.request.content_type.clone(),
            size: object.len() as u64,
            logical_type: session.request.logical_type,
            category: "other".to_string(),
            completed_at: Utc::now(),
        };
        session.confirmed = Some(file.clone());

        let mut script = self.script.lock().unwrap();
        if let Some((left, status)) = script.lost_confirms.as_mut() {
            if *left > 0 {
                *left -= 1;
                return Err(http(*status, "INTERNAL_ERROR", "record sink unavailable"));
            }
        }
        Ok(file)
    }

    async fn detail(
        &self,
        session_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<UploadSessionDetail, TransferError> {
        self.record("detail");
        let sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get(&session_id)
            .ok_or_else(|| http(404, "NOT_FOUND", "unknown session"))?;
        let completed = session.confirmed.is_some();
        Ok(UploadSessionDetail {
            session_id,
            status: if completed {
                UploadStatus::Completed
            } else {
                UploadStatus::Uploading
            },
            percentage: if completed { 100 } else { 0 },
            file_name: session.request.file_name.clone(),
            file_size: session.request.file_size,
            logical_type: session.request.logical_type,
            upload_mode: session.request.upload_mode.unwrap_or(UploadMode::Direct),
            retry_count: 0,
            last_error: None,
            parts: None,
            can_resume: !completed,
            estimated_seconds_remaining: None,
            file: session.confirmed.clone(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }

    async fn cancel(&self, session_id: Uuid) -> Result<CancelUploadResponse, TransferError> {
        self.record("cancel");
        if self.script.lock().unwrap().fail_cancel {
            return Err(TransferError::Network("connection reset".to_string()));
        }
        if self.sessions.lock().unwrap().remove(&session_id).is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(CancelUploadResponse {
            session_id,
            status: UploadStatus::Cancelled,
        })
    }
}
