pub mod upload_sessions;

pub use upload_sessions::{
    session_key, InMemorySessionStore, LoggingRecordSink, MediaRecordSink, SessionStore,
    UploadSessionService,
};
