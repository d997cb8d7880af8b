//! Resumable upload client for the Mediaup API.
//!
//! [`ApiClient`] talks to the upload session endpoints over HTTP and implements
//! [`UploadTransport`]. [`TransferController`] drives one file through initiation, chunked
//! or whole-object transfer, finalization and confirmation, with pause, resume, retry and
//! cancel. [`BatchOrchestrator`] runs many transfers under a concurrency cap.

pub mod api;
pub mod batch;
pub mod error;
pub mod progress;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use batch::{BatchFailure, BatchOrchestrator, BatchProgress, BatchResult};
pub use error::TransferError;
pub use progress::{SpeedMeter, TransferProgress};
pub use transfer::{
    Part, Payload, Preprocessor, TransferConfig, TransferController, TransferSnapshot,
    TransferStatus,
};
pub use transport::{ByteCounter, UploadTransport};

/// HTTP client for the Mediaup upload API, authenticated with a bearer JWT.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Create client from environment: MEDIAUP_API_URL (default http://localhost:3000) and
    /// MEDIAUP_TOKEN.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("MEDIAUP_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let token = std::env::var("MEDIAUP_TOKEN").context("Missing token. Set MEDIAUP_TOKEN")?;

        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// Send `request` and deserialize a JSON success body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, TransferError> {
        let response = self.send(request, cancel).await?;
        until_cancelled(cancel, async {
            response
                .json::<T>()
                .await
                .map_err(|e| TransferError::Decode(e.to_string()))
        })
        .await
    }

    /// Send `request`, turning non-success statuses into `TransferError::Http`.
    async fn send(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, TransferError> {
        until_cancelled(cancel, async {
            let response = request.send().await?;
            if response.status().is_success() {
                Ok(response)
            } else {
                Err(error_from_response(response).await)
            }
        })
        .await
    }
}

/// Error body written by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

async fn error_from_response(response: Response) -> TransferError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    parse_error_body(status, &text)
}

fn parse_error_body(status: u16, text: &str) -> TransferError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => TransferError::Http {
            status,
            code: body.code,
            message: body.error,
        },
        Err(_) => TransferError::Http {
            status,
            code: None,
            message: if text.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                text.to_string()
            },
        },
    }
}

/// Run `fut` unless `cancel` fires first, in which case the call is dropped.
pub(crate) async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Aborted),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_is_parsed_when_json() {
        let err = parse_error_body(
            409,
            r#"{"error":"Upload already completed","code":"CONFLICT","recoverable":false}"#,
        );
        match err {
            TransferError::Http {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 409);
                assert_eq!(code.as_deref(), Some("CONFLICT"));
                assert_eq!(message, "Upload already completed");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = parse_error_body(502, "");
        assert_eq!(err.to_string(), "HTTP 502: Unknown error");
    }

    #[test]
    fn build_url_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:3000/".to_string(), "t".to_string())
            .expect("client");
        assert_eq!(
            client.build_url("/uploads/sessions"),
            "http://localhost:3000/uploads/sessions"
        );
    }

    #[tokio::test]
    async fn cancelled_token_aborts_pending_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), TransferError> =
            until_cancelled(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(TransferError::Aborted)));
    }
}
