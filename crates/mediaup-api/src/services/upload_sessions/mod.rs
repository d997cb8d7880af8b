//! Upload sessions: registry, lifecycle service and the finalized-file hand-off

mod service;
mod sink;
mod store;

pub use service::UploadSessionService;
pub use sink::{LoggingRecordSink, MediaRecordSink};
pub use store::{session_key, InMemorySessionStore, SessionStore, SESSION_PREFIX};
