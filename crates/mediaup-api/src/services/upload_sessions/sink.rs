//! Hand-off point for finalized files
//!
//! Persisting media records belongs to the surrounding application. The session service only
//! needs somewhere to send a `FinalizedFile` once an upload is confirmed.

use async_trait::async_trait;
use mediaup_core::models::FinalizedFile;
use mediaup_core::AppError;

#[async_trait]
pub trait MediaRecordSink: Send + Sync {
    async fn record(&self, file: &FinalizedFile) -> Result<(), AppError>;
}

/// Default sink: writes the record to the log
#[derive(Debug, Default, Clone)]
pub struct LoggingRecordSink;

#[async_trait]
impl MediaRecordSink for LoggingRecordSink {
    async fn record(&self, file: &FinalizedFile) -> Result<(), AppError> {
        tracing::info!(
            session_id = %file.session_id,
            owner_id = %file.owner_id,
            key = %file.key,
            size_bytes = file.size,
            content_type = %file.content_type,
            logical_type = %file.logical_type,
            "Upload finalized"
        );
        Ok(())
    }
}
