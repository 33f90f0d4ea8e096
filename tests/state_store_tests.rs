//! State store: batching, resubmission, retention and conditional writes.

use async_trait::async_trait;
use ruleflow::config::{StoreBackend, StoreConfig};
use ruleflow::state::{SessionState, StateDiff};
use ruleflow::store::{
    open_store, BatchBackend, BatchedStateStore, FileBackend, MemoryBackend, StoreResult,
    WriteGuard, WriteRequest,
};
use ruleflow::{StateStore, StoreError, TrackedState};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Commits at most `per_call` requests per write and hands back the rest
struct FlakyBackend {
    inner: MemoryBackend,
    per_call: usize,
    calls: AtomicUsize,
    largest_batch: AtomicUsize,
}

impl FlakyBackend {
    fn new(per_call: usize) -> Self {
        Self {
            inner: MemoryBackend::new(),
            per_call,
            calls: AtomicUsize::new(0),
            largest_batch: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BatchBackend for FlakyBackend {
    fn max_batch_size(&self) -> usize {
        10
    }

    async fn query(&self, session_id: &str, now: i64) -> StoreResult<Vec<(String, String)>> {
        self.inner.query(session_id, now).await
    }

    async fn batch_write(
        &self,
        session_id: &str,
        now: i64,
        mut requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(requests.len(), Ordering::SeqCst);

        let rest = requests.split_off(self.per_call.min(requests.len()));
        self.inner.batch_write(session_id, now, requests).await?;
        Ok(rest)
    }

    async fn conditional_write(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<bool> {
        self.inner
            .conditional_write(session_id, guard, now, requests)
            .await
    }

    async fn purge_expired(&self, now: i64) -> StoreResult<usize> {
        self.inner.purge_expired(now).await
    }
}

fn wide_diff(keys: usize) -> StateDiff {
    let mut diff = StateDiff::new();
    for i in 0..keys {
        diff.put(format!("Key{i:02}"), json!(format!("value-{i}")));
    }
    diff
}

#[tokio::test]
async fn test_unprocessed_requests_are_resubmitted() {
    let store = BatchedStateStore::with_limits(FlakyBackend::new(3), 3600, 25);
    store.save_diff("s-1", &wide_diff(40)).await.unwrap();

    let state = store.load("s-1").await.unwrap();
    assert_eq!(state.len(), 40);
    assert_eq!(state.get_str("Key39"), Some("value-39"));

    // Backend limit (10) wins over the configured 25
    assert!(store.backend().largest_batch.load(Ordering::SeqCst) <= 10);
    // 40 requests at 3 per call
    assert!(store.backend().calls.load(Ordering::SeqCst) >= 14);
}

#[tokio::test]
async fn test_configured_batch_limit_applies() {
    let store = BatchedStateStore::with_limits(FlakyBackend::new(usize::MAX), 3600, 4);
    store.save_diff("s-2", &wide_diff(9)).await.unwrap();

    assert_eq!(store.backend().largest_batch.load(Ordering::SeqCst), 4);
    assert_eq!(store.backend().calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_empty_diff_writes_nothing() {
    let store = BatchedStateStore::with_limits(FlakyBackend::new(10), 3600, 25);
    let mut state = TrackedState::new(SessionState::new());
    state.set("A", "1");
    state.commit();
    state.set("A", "1");

    store.save_diff("s-3", &state.diff()).await.unwrap();
    assert_eq!(store.backend().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_structured_values_round_trip() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 3600, 25);
    let mut diff = StateDiff::new();
    diff.put("Customer", json!({"AccountNumber": "A1", "Tags": ["x", "y"]}));
    diff.put("Plain", json!("text"));
    store.save_diff("s-4", &diff).await.unwrap();

    let state = store.load("s-4").await.unwrap();
    assert_eq!(state.lookup("Customer.AccountNumber"), Some(json!("A1")));
    assert_eq!(state.get_str("Plain"), Some("text"));
}

#[tokio::test]
async fn test_deletes_and_empty_strings_remove_keys() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 3600, 25);
    let mut diff = StateDiff::new();
    diff.put("A", json!("1"));
    diff.put("B", json!("2"));
    store.save_diff("s-5", &diff).await.unwrap();

    let mut diff = StateDiff::new();
    diff.delete("A");
    diff.put("B", json!(""));
    store.save_diff("s-5", &diff).await.unwrap();

    assert!(store.load("s-5").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_attributes_are_invisible() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 0, 25);
    store.save_diff("s-6", &wide_diff(2)).await.unwrap();
    assert!(store.load("s-6").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_attributes_are_removed_on_write() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 0, 25);
    store.save_diff("s-6a", &wide_diff(2)).await.unwrap();
    assert_eq!(store.backend().session_count(), 0);

    let tmp = TempDir::new().unwrap();
    let store = BatchedStateStore::with_limits(FileBackend::open(tmp.path()).unwrap(), 0, 25);
    store.save_diff("s-6b", &wide_diff(2)).await.unwrap();
    assert!(!tmp.path().join("s-6b.json").exists());
}

#[tokio::test]
async fn test_purge_keeps_live_sessions() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 3600, 25);
    store.save_diff("s-6c", &wide_diff(2)).await.unwrap();

    assert_eq!(store.purge_expired().await.unwrap(), 0);
    assert_eq!(store.load("s-6c").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_guarded_write_rejected() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 3600, 25);
    let mut diff = StateDiff::new();
    diff.put("IntegrationStatus", json!("DONE"));
    store.save_diff("s-7", &diff).await.unwrap();

    let guard = WriteGuard::new("IntegrationStatus", vec![Some("START".to_string())]);
    let mut late = StateDiff::new();
    late.put("IntegrationStatus", json!("TIMEOUT"));
    assert!(!store.save_diff_if("s-7", &guard, &late).await.unwrap());

    let absent = WriteGuard::new("Lock", vec![None]);
    let mut first = StateDiff::new();
    first.put("Lock", json!("held"));
    assert!(store.save_diff_if("s-7", &absent, &first).await.unwrap());
    assert!(!store.save_diff_if("s-7", &absent, &first).await.unwrap());

    let state = store.load("s-7").await.unwrap();
    assert_eq!(state.get_str("IntegrationStatus"), Some("DONE"));
    assert_eq!(state.get_str("Lock"), Some("held"));
}

#[tokio::test]
async fn test_invalid_session_ids_rejected() {
    let store = BatchedStateStore::with_limits(MemoryBackend::new(), 3600, 25);
    for bad in ["", "../etc", "a/b", ".hidden"] {
        let err = store.load(bad).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSessionId(_)), "{bad}");
    }
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig {
        backend: StoreBackend::File,
        data_dir: tmp.path().join("sessions"),
        ..StoreConfig::default()
    };

    let store = open_store(&config).unwrap();
    store.save_diff("s-8", &wide_diff(3)).await.unwrap();
    drop(store);

    let reopened = open_store(&config).unwrap();
    let state = reopened.load("s-8").await.unwrap();
    assert_eq!(state.len(), 3);
    assert_eq!(state.get_str("Key01"), Some("value-1"));
}
