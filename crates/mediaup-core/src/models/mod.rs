//! Data models for the upload service
//!
//! Session state kept by the server and the request/response bodies shared by the API
//! and the client.

mod upload_session;

pub use upload_session::*;
