//! Client-side transfer errors

use mediaup_core::{AttemptTimeout, Retryable};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Connection failed, reset or timed out before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The in-flight call was interrupted by its cancellation token
    #[error("Request aborted")]
    Aborted,

    #[error("Transfer paused")]
    Paused,

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Invalid transfer state: {0}")]
    InvalidState(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl TransferError {
    /// Machine code from the server error body, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            TransferError::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl Retryable for TransferError {
    fn status_code(&self) -> Option<u16> {
        match self {
            TransferError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_network_error(&self) -> bool {
        matches!(self, TransferError::Network(_) | TransferError::Timeout(_))
    }
}

impl From<AttemptTimeout> for TransferError {
    fn from(timeout: AttemptTimeout) -> Self {
        TransferError::Timeout(timeout.0)
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransferError::Http {
                status: status.as_u16(),
                code: None,
                message: err.to_string(),
            },
            None if err.is_decode() => TransferError::Decode(err.to_string()),
            None => TransferError::Network(err.to_string()),
        }
    }
}
