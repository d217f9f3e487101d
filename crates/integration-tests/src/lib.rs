//! Integration test helpers for the Copperleaf cart engine.
//!
//! Scenario tests live in `tests/` and exercise the synchronizer end-to-end
//! against in-memory adapters. The helpers here provide:
//!
//! - [`RecordingRemoteStore`] - an in-memory remote cart service that logs
//!   every call and supports failure/latency injection
//! - snapshot and line builders
//! - test logging initialization
//!
//! Run with: `cargo test -p copperleaf-integration-tests`

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use copperleaf_cart::remote::{
    RemoteCartRecord, RemoteCartStore, RemoteStoreError, decode_lines, encode_lines,
};
use copperleaf_core::{CartLine, ProductSnapshot, RecordId, UserId};

/// Initialize test logging once; honors `RUST_LOG`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a product snapshot for tests.
#[must_use]
pub fn snapshot(id: &str, price: &str) -> ProductSnapshot {
    ProductSnapshot {
        id: id.to_string(),
        name: format!("Product {id}"),
        price: price.parse().expect("test price must parse"),
        images: vec![format!("https://img.example.com/{id}.jpg")],
    }
}

/// Build a cart line for tests.
#[must_use]
pub fn line(id: &str, price: &str, quantity: u32, color: &str) -> CartLine {
    CartLine::new(snapshot(id, price), quantity, color)
}

/// One observed call against the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch(UserId),
    Create(UserId),
    Update(RecordId),
}

/// In-memory remote cart service with call recording.
///
/// Keyed by user like the real service (one record per user, looked up by
/// equality). Failure injection flips every call of the given kind into an
/// HTTP-500-shaped error; latency injection delays fetches so tests can
/// interleave identity transitions with in-flight loads.
#[derive(Default)]
pub struct RecordingRemoteStore {
    records: Mutex<HashMap<UserId, RemoteCartRecord>>,
    calls: Mutex<Vec<RemoteCall>>,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl RecordingRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record for `user`, as if a previous session had synced it.
    pub fn seed(&self, user: &UserId, lines: &[CartLine]) {
        let record = RemoteCartRecord {
            id: RecordId::new(Uuid::new_v4().to_string()),
            user_id: user.clone(),
            items_json: encode_lines(lines),
        };
        self.records().insert(user.clone(), record);
    }

    /// Decode the lines currently stored for `user`, empty if no record.
    #[must_use]
    pub fn stored_lines(&self, user: &UserId) -> Vec<CartLine> {
        self.records()
            .get(user)
            .map(|record| decode_lines(&record.items_json))
            .unwrap_or_default()
    }

    /// Every call observed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Number of write calls (create + update) observed so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Create(_) | RemoteCall::Update(_)))
            .count()
    }

    /// Make every fetch fail with a server error.
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Make every create/update fail with a server error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every fetch by `delay` (tokio virtual time applies).
    pub fn delay_fetches(&self, delay: Duration) {
        *self
            .fetch_delay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(delay);
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, RemoteCartRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record_call(&self, call: RemoteCall) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(call);
    }

    fn server_error() -> RemoteStoreError {
        RemoteStoreError::Api {
            status: 500,
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl RemoteCartStore for RecordingRemoteStore {
    async fn fetch_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<RemoteCartRecord>, RemoteStoreError> {
        self.record_call(RemoteCall::Fetch(user_id.clone()));

        let delay = *self
            .fetch_delay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        Ok(self.records().get(user_id).cloned())
    }

    async fn create(
        &self,
        user_id: &UserId,
        lines: &[CartLine],
    ) -> Result<RemoteCartRecord, RemoteStoreError> {
        self.record_call(RemoteCall::Create(user_id.clone()));

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let record = RemoteCartRecord {
            id: RecordId::new(Uuid::new_v4().to_string()),
            user_id: user_id.clone(),
            items_json: encode_lines(lines),
        };
        self.records().insert(user_id.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        record_id: &RecordId,
        lines: &[CartLine],
    ) -> Result<RemoteCartRecord, RemoteStoreError> {
        self.record_call(RemoteCall::Update(record_id.clone()));

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let mut records = self.records();
        let record = records
            .values_mut()
            .find(|record| &record.id == record_id)
            .ok_or(RemoteStoreError::Api {
                status: 404,
                message: format!("record not found: {record_id}"),
            })?;
        record.items_json = encode_lines(lines);
        Ok(record.clone())
    }
}
