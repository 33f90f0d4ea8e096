//! Session State Store
//!
//! Durable per-session key/value storage with a retention window.
//!
//! ## Architecture
//!
//! ```text
//! StateStore (trait, object safe)
//! └── BatchedStateStore<B>
//!     ├── encodes values to text, stamps expiry
//!     ├── chunks writes to the backend batch limit
//!     ├── resubmits unprocessed requests until committed
//!     └── purges expired attributes (on write, and by the reaper)
//!         B: BatchBackend
//!         ├── MemoryBackend (DashMap)
//!         └── FileBackend (one JSON file per session)
//! ```

mod batch;
mod file;
mod memory;

pub use batch::{BatchBackend, BatchedStateStore, StoredAttribute, WriteRequest};
pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::config::{StoreBackend, StoreConfig};
use crate::state::{SessionState, StateDiff};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// State store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend rejected the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// Session id cannot be used as a storage key
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Precondition for a conditional write.
///
/// The write applies only when the stored text of `key` is one of `allowed`;
/// `None` in `allowed` matches an absent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGuard {
    pub key: String,
    pub allowed: Vec<Option<String>>,
}

impl WriteGuard {
    pub fn new(key: impl Into<String>, allowed: Vec<Option<String>>) -> Self {
        Self {
            key: key.into(),
            allowed,
        }
    }

    pub fn permits(&self, current: Option<&str>) -> bool {
        self.allowed.iter().any(|a| a.as_deref() == current)
    }
}

/// Persistence seam for session state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load every live attribute of a session. Unknown sessions are empty.
    async fn load(&self, session_id: &str) -> StoreResult<SessionState>;

    /// Persist a diff. Returns once every request is committed.
    async fn save_diff(&self, session_id: &str, diff: &StateDiff) -> StoreResult<()>;

    /// Persist a diff atomically if the guard holds. Returns whether it applied.
    async fn save_diff_if(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        diff: &StateDiff,
    ) -> StoreResult<bool>;

    /// Drop expired attributes from the backing storage. Returns how many went.
    async fn purge_expired(&self) -> StoreResult<usize>;
}

/// Open the store selected by configuration
pub fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.backend {
        StoreBackend::Memory => Arc::new(BatchedStateStore::new(MemoryBackend::new(), config)),
        StoreBackend::File => Arc::new(BatchedStateStore::new(
            FileBackend::open(&config.data_dir)?,
            config,
        )),
    };
    tracing::info!(backend = ?config.backend, "state_store_opened");
    Ok(store)
}

/// Session ids become file names and map keys; keep them to a safe alphabet
pub(crate) fn validate_session_id(session_id: &str) -> StoreResult<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSessionId(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_permits() {
        let guard = WriteGuard::new(
            "IntegrationStatus",
            vec![Some("START".to_string()), Some("RUN".to_string())],
        );
        assert!(guard.permits(Some("RUN")));
        assert!(!guard.permits(Some("DONE")));
        assert!(!guard.permits(None));

        let absent = WriteGuard::new("K", vec![None]);
        assert!(absent.permits(None));
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("c0ffee-12_ab.3").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id(".hidden").is_err());
        assert!(validate_session_id("a/b").is_err());
    }
}
