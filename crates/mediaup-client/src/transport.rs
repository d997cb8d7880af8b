//! Transport seam between the transfer controller and the upload API

use async_trait::async_trait;
use bytes::Bytes;
use mediaup_core::models::{
    CancelUploadResponse, CompletePartsResponse, FinalizedFile, InitiateUploadRequest,
    InitiateUploadResponse, PartUploadResponse, UploadSessionDetail, UploadedPartsResponse,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TransferError;

/// Called with the number of bytes just handed to the network
pub type ByteCounter = Arc<dyn Fn(u64) + Send + Sync>;

/// Every call that moves bytes or changes session state takes a cancellation token and must
/// return `TransferError::Aborted` promptly once it fires.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn initiate(
        &self,
        request: &InitiateUploadRequest,
        cancel: &CancellationToken,
    ) -> Result<InitiateUploadResponse, TransferError>;

    /// PUT the whole object to a presigned or relay URL
    async fn put_object(
        &self,
        url: &str,
        data: Bytes,
        content_type: &str,
        on_bytes: ByteCounter,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError>;

    async fn upload_part(
        &self,
        session_id: Uuid,
        index: u32,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<PartUploadResponse, TransferError>;

    async fn uploaded_parts(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<UploadedPartsResponse, TransferError>;

    async fn complete_parts(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<CompletePartsResponse, TransferError>;

    async fn confirm(
        &self,
        session_id: Uuid,
        actual_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<FinalizedFile, TransferError>;

    /// Server view of the session, including the finalized file once completed
    async fn detail(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<UploadSessionDetail, TransferError>;

    /// Not cancellable: it runs after the transfer's own token has fired
    async fn cancel(&self, session_id: Uuid) -> Result<CancelUploadResponse, TransferError>;
}
