//! Upload session registry
//!
//! A keyed store with per-entry expiry. The session service is the only writer; it reads a
//! session, validates it, then uses `compare_and_set` so a transition only lands if nobody
//! moved the session in between (a confirm racing a cancel cannot resurrect the loser).

use async_trait::async_trait;
use mediaup_core::models::{UploadSession, UploadStatus};
use mediaup_core::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};

/// Registry key prefix for upload sessions
pub const SESSION_PREFIX: &str = "upload_session:";

pub fn session_key(id: &uuid::Uuid) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace `key`, expiring after `ttl`
    async fn put(&self, key: &str, session: UploadSession, ttl: Duration) -> Result<(), AppError>;

    /// Live entry for `key`; expired entries read as absent
    async fn get(&self, key: &str) -> Result<Option<UploadSession>, AppError>;

    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Replace the entry only if its current status is `expected`. The entry keeps its
    /// expiry. Returns whether the swap happened.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: UploadStatus,
        session: UploadSession,
    ) -> Result<bool, AppError>;

    /// Drop every expired entry, returning how many were removed
    async fn purge_expired(&self) -> Result<usize, AppError>;
}

#[derive(Debug, Clone)]
struct Entry {
    session: UploadSession,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local registry; entries vanish on restart
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Start the background sweep that purges expired entries every `every`
    /// Returns a JoinHandle for graceful shutdown
    pub fn start_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(every);

            loop {
                sweep_interval.tick().await;

                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::info!(removed = removed, "Purged expired upload sessions");
                    }
                    Err(e) => tracing::error!(error = %e, "Upload session sweep failed"),
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, key: &str, session: UploadSession, ttl: Duration) -> Result<(), AppError> {
        let entry = Entry {
            session,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<UploadSession>, AppError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.session.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: UploadStatus,
        session: UploadSession,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.session.status == expected => {
                entry.session = session;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<usize, AppError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}
