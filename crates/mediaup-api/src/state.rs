//! Shared application state handed to every handler

use crate::auth::AuthState;
use crate::services::UploadSessionService;
use mediaup_core::Config;
use mediaup_storage::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub uploads: Arc<UploadSessionService>,
    pub auth: Arc<AuthState>,
}
