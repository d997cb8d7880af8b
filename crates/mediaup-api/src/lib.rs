//! Mediaup API Library
//!
//! This crate provides the upload session registry and lifecycle service, the HTTP handlers,
//! authentication and application setup.

// Module declarations
mod api_doc;
mod handlers;
mod telemetry;

// Public modules
pub mod auth;
pub mod error;
pub mod services;
pub mod setup;
pub mod state;

// Re-exports
pub use api_doc::ApiDoc;
pub use error::ErrorResponse;
pub use services::{
    InMemorySessionStore, LoggingRecordSink, MediaRecordSink, SessionStore, UploadSessionService,
};
pub use state::AppState;
pub use telemetry::{init_telemetry, LogFormat};
