//! Upload session endpoints over HTTP

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mediaup_core::models::{
    CancelUploadResponse, CompletePartsResponse, ConfirmUploadRequest, FinalizedFile,
    InitiateUploadRequest, InitiateUploadResponse, PartUploadResponse, UploadSessionDetail,
    UploadedPartsResponse,
};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TransferError;
use crate::transport::{ByteCounter, UploadTransport};
use crate::ApiClient;

/// Body slice size for streamed PUTs; progress is reported per slice
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

fn session_path(session_id: Uuid) -> String {
    format!("/uploads/sessions/{}", session_id)
}

/// Split `data` into zero-copy slices of at most `size` bytes
fn slices(data: &Bytes, size: usize) -> Vec<Bytes> {
    (0..data.len())
        .step_by(size.max(1))
        .map(|start| data.slice(start..(start + size).min(data.len())))
        .collect()
}

#[async_trait]
impl UploadTransport for ApiClient {
    async fn initiate(
        &self,
        request: &InitiateUploadRequest,
        cancel: &CancellationToken,
    ) -> Result<InitiateUploadResponse, TransferError> {
        let builder = self
            .authorized(self.client.post(self.build_url("/uploads/sessions")))
            .json(request);
        self.send_json(builder, cancel).await
    }

    async fn put_object(
        &self,
        url: &str,
        data: Bytes,
        content_type: &str,
        on_bytes: ByteCounter,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let length = data.len();
        let stream = futures::stream::iter(slices(&data, STREAM_CHUNK_SIZE)).map(move |chunk| {
            on_bytes(chunk.len() as u64);
            Ok::<Bytes, std::io::Error>(chunk)
        });

        // Presigned URLs carry their own authorization; a bearer header would break them
        let builder = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(stream));

        self.send(builder, cancel).await.map(|_| ())
    }

    async fn upload_part(
        &self,
        session_id: Uuid,
        index: u32,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<PartUploadResponse, TransferError> {
        let url = self.build_url(&format!("{}/parts/{}", session_path(session_id), index));
        let builder = self
            .authorized(self.client.put(url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data);
        self.send_json(builder, cancel).await
    }

    async fn uploaded_parts(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<UploadedPartsResponse, TransferError> {
        let url = self.build_url(&format!("{}/parts", session_path(session_id)));
        self.send_json(self.authorized(self.client.get(url)), cancel)
            .await
    }

    async fn complete_parts(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<CompletePartsResponse, TransferError> {
        let url = self.build_url(&format!("{}/parts/complete", session_path(session_id)));
        self.send_json(self.authorized(self.client.post(url)), cancel)
            .await
    }

    async fn confirm(
        &self,
        session_id: Uuid,
        actual_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<FinalizedFile, TransferError> {
        let url = self.build_url(&format!("{}/confirm", session_path(session_id)));
        let builder = self
            .authorized(self.client.post(url))
            .json(&ConfirmUploadRequest { actual_size });
        self.send_json(builder, cancel).await
    }

    async fn detail(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<UploadSessionDetail, TransferError> {
        let url = self.build_url(&format!("{}/detail", session_path(session_id)));
        self.send_json(self.authorized(self.client.get(url)), cancel)
            .await
    }

    async fn cancel(&self, session_id: Uuid) -> Result<CancelUploadResponse, TransferError> {
        let url = self.build_url(&session_path(session_id));
        self.send_json(self.authorized(self.client.delete(url)), &CancellationToken::new())
            .await
    }
}
