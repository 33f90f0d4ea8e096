//! File backend: one JSON document per session.
//!
//! ```text
//! data_dir/
//! ├── <session-id>.json   { "key": { "value": "...", "expires_at": 1700000000 } }
//! └── ...
//! ```
//!
//! Writes go to a temp file and are renamed into place. File work runs on
//! the blocking pool under a single mutex; conditional writes check and
//! apply under it. Expired attributes are dropped whenever a file is
//! rewritten.

use super::batch::{BatchBackend, StoredAttribute, WriteRequest};
use super::memory::{apply, live_text, purge};
use super::{validate_session_id, StoreError, StoreResult, WriteGuard};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Attributes = HashMap<String, StoredAttribute>;

/// Session files plus the lock that serializes access to them
struct SessionFiles {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl SessionFiles {
    fn read(&self, path: &Path) -> StoreResult<Attributes> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Attributes::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, attributes: &Attributes) -> StoreResult<()> {
        if attributes.is_empty() {
            return match fs::remove_file(path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(attributes)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn session_files(&self) -> StoreResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

pub struct FileBackend {
    files: Arc<SessionFiles>,
}

impl FileBackend {
    /// Open (and create if needed) the session directory
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            files: Arc::new(SessionFiles {
                dir,
                lock: Mutex::new(()),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.files.dir
    }

    fn session_path(&self, session_id: &str) -> StoreResult<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.files.dir.join(format!("{session_id}.json")))
    }

    /// Run file work on the blocking pool with the lock held
    async fn locked<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SessionFiles) -> StoreResult<T> + Send + 'static,
    {
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || {
            let _guard = files.lock.lock();
            work(&files)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("file task failed: {e}")))?
    }
}

#[async_trait]
impl BatchBackend for FileBackend {
    fn max_batch_size(&self) -> usize {
        25
    }

    async fn query(&self, session_id: &str, now: i64) -> StoreResult<Vec<(String, String)>> {
        let path = self.session_path(session_id)?;
        let attributes = self.locked(move |files| files.read(&path)).await?;
        Ok(attributes
            .into_iter()
            .filter(|(_, a)| a.is_live(now))
            .map(|(k, a)| (k, a.value))
            .collect())
    }

    async fn batch_write(
        &self,
        session_id: &str,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>> {
        let path = self.session_path(session_id)?;
        self.locked(move |files| {
            let mut attributes = files.read(&path)?;
            apply(&mut attributes, requests, now);
            files.write(&path, &attributes)
        })
        .await?;
        Ok(Vec::new())
    }

    async fn conditional_write(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<bool> {
        let path = self.session_path(session_id)?;
        let guard = guard.clone();
        self.locked(move |files| {
            let mut attributes = files.read(&path)?;
            if !guard.permits(live_text(&attributes, &guard.key, now)) {
                return Ok(false);
            }
            apply(&mut attributes, requests, now);
            files.write(&path, &attributes)?;
            Ok(true)
        })
        .await
    }

    async fn purge_expired(&self, now: i64) -> StoreResult<usize> {
        self.locked(move |files| {
            let mut removed = 0;
            for path in files.session_files()? {
                let mut attributes = files.read(&path)?;
                let purged = purge(&mut attributes, now);
                if purged > 0 {
                    files.write(&path, &attributes)?;
                    removed += purged;
                }
            }
            Ok(removed)
        })
        .await
    }
}
