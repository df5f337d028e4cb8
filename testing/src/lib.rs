//! # Idempotent Request Testing
//!
//! Testing utilities and reference collaborators for the idempotent request
//! protocol.
//!
//! This crate provides:
//! - An in-memory [`Storage`] implementation with fail-fast locking
//! - A [`Notifier`] that records every replay notification
//! - A counting stub for the protected operation, for proving the
//!   at-most-once property
//! - A tracing initializer for integration tests
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use idempotent_request_core::{IdempotencyKey, ReadOutcome, RequestCoordinator};
//! use idempotent_request_testing::InMemoryStorage;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let storage = Arc::new(InMemoryStorage::new());
//! let coordinator = RequestCoordinator::new(storage);
//!
//! let key = IdempotencyKey::new("payment-123");
//! assert!(coordinator.lock(key.clone()).await.unwrap());
//! let outcome = coordinator.read(key, b"{}").await.unwrap();
//! assert_eq!(outcome, ReadOutcome::NoRecord);
//! # }
//! ```

use idempotent_request_core::key::IdempotencyKey;
use idempotent_request_core::notifier::{Notifier, ReplayAction};
use idempotent_request_core::record::{CapturedResponse, Headers, ResponseBody};
use idempotent_request_core::storage::{Storage, StorageError};

/// Mock implementations of the protocol's collaborator traits.
pub mod mocks {
    #![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

    use super::{
        CapturedResponse, Headers, IdempotencyKey, Notifier, ReplayAction, ResponseBody, Storage,
        StorageError,
    };
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    /// In-memory storage backend with fail-fast, non-blocking locking.
    ///
    /// Locks and records live in two independent async-mutex-guarded maps,
    /// mirroring a backend where the lock primitive and the record store are
    /// separate gates. `lock` never waits: it returns `false` immediately
    /// when the key is already held.
    ///
    /// Deterministic and dependency-free, intended for tests and local
    /// development, not production use.
    #[derive(Debug, Default)]
    pub struct InMemoryStorage {
        locks: AsyncMutex<HashSet<String>>,
        records: AsyncMutex<HashMap<String, Vec<u8>>>,
    }

    impl InMemoryStorage {
        /// Create an empty storage backend.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Whether `key` is currently locked. Test inspection helper.
        pub async fn is_locked(&self, key: &str) -> bool {
            self.locks.lock().await.contains(key)
        }

        /// Fetch the raw stored bytes for `key`, if any. Test inspection
        /// helper for asserting on the wire encoding.
        pub async fn raw_record(&self, key: &str) -> Option<Vec<u8>> {
            self.records.lock().await.get(key).cloned()
        }

        /// Seed raw bytes for `key`, bypassing the coordinator. Used to
        /// exercise malformed-record handling.
        pub async fn seed_raw(&self, key: &str, bytes: Vec<u8>) {
            self.records.lock().await.insert(key.to_string(), bytes);
        }
    }

    impl Storage for InMemoryStorage {
        fn lock(
            &self,
            key: IdempotencyKey,
        ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>> {
            Box::pin(async move {
                let mut locks = self.locks.lock().await;
                Ok(locks.insert(key.into_inner()))
            })
        }

        fn unlock(
            &self,
            key: IdempotencyKey,
        ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
            Box::pin(async move {
                let mut locks = self.locks.lock().await;
                locks.remove(key.as_str());
                Ok(())
            })
        }

        fn read(
            &self,
            key: IdempotencyKey,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, StorageError>> + Send + '_>>
        {
            Box::pin(async move {
                let records = self.records.lock().await;
                Ok(records.get(key.as_str()).cloned())
            })
        }

        fn write(
            &self,
            key: IdempotencyKey,
            record: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
            Box::pin(async move {
                let mut records = self.records.lock().await;
                records.insert(key.into_inner(), record);
                Ok(())
            })
        }
    }

    /// Storage that fails every call with the given error message.
    ///
    /// For asserting that backend failures propagate unchanged through the
    /// coordinator.
    #[derive(Debug)]
    pub struct FailingStorage {
        message: String,
    }

    impl FailingStorage {
        /// Create a storage backend that always reports `message`.
        #[must_use]
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }

        fn error(&self) -> StorageError {
            StorageError::Unavailable(self.message.clone())
        }
    }

    impl Storage for FailingStorage {
        fn lock(
            &self,
            _key: IdempotencyKey,
        ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>> {
            Box::pin(async move { Err(self.error()) })
        }

        fn unlock(
            &self,
            _key: IdempotencyKey,
        ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
            Box::pin(async move { Err(self.error()) })
        }

        fn read(
            &self,
            _key: IdempotencyKey,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, StorageError>> + Send + '_>>
        {
            Box::pin(async move { Err(self.error()) })
        }

        fn write(
            &self,
            _key: IdempotencyKey,
            _record: Vec<u8>,
        ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
            Box::pin(async move { Err(self.error()) })
        }
    }

    /// Notifier that records every notification it receives.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        notifications: Mutex<Vec<(ReplayAction, String)>>,
    }

    impl RecordingNotifier {
        /// Create a notifier with no recorded notifications.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All notifications received so far, in order.
        ///
        /// # Panics
        ///
        /// Panics if the interior mutex was poisoned by a panicking test.
        #[must_use]
        #[allow(clippy::expect_used)]
        pub fn notifications(&self) -> Vec<(ReplayAction, String)> {
            self.notifications
                .lock()
                .expect("notification log poisoned")
                .clone()
        }

        /// Number of replays detected so far.
        #[must_use]
        pub fn detection_count(&self) -> usize {
            self.notifications().len()
        }
    }

    impl Notifier for RecordingNotifier {
        #[allow(clippy::expect_used)]
        fn notify(&self, action: ReplayAction, key: &IdempotencyKey) {
            self.notifications
                .lock()
                .expect("notification log poisoned")
                .push((action, key.as_str().to_string()));
        }
    }

    /// Stub for the protected side-effecting operation.
    ///
    /// Counts how many times it runs and returns a fixed response, so tests
    /// can prove the operation executed exactly once across repeated
    /// submissions of the same key.
    #[derive(Debug)]
    pub struct CountingOperation {
        calls: AtomicUsize,
        status: u16,
        headers: Headers,
        body: Vec<Vec<u8>>,
    }

    impl CountingOperation {
        /// Create an operation stub returning the given response.
        #[must_use]
        pub fn new(status: u16, headers: Headers, body: ResponseBody) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status,
                headers,
                body: body.into_chunks(),
            }
        }

        /// Run the "operation": count the invocation and hand back the
        /// configured outcome.
        pub fn run(&self) -> (u16, Headers, ResponseBody) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (
                self.status,
                self.headers.clone(),
                ResponseBody::Chunks(self.body.clone()),
            )
        }

        /// The response this stub produces, as the caller-facing triple.
        #[must_use]
        pub fn expected_response(&self) -> CapturedResponse {
            CapturedResponse {
                status: self.status,
                headers: self.headers.clone(),
                body: self.body.clone(),
            }
        }

        /// How many times the operation has run.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Install a compact tracing subscriber honoring `RUST_LOG`.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .compact()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_tracing;
pub use mocks::{CountingOperation, FailingStorage, InMemoryStorage, RecordingNotifier};

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)] // Test code can use expect

    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn lock_is_fail_fast_and_exclusive() {
        let storage = InMemoryStorage::new();
        let key = IdempotencyKey::new("abc");

        assert!(storage.lock(key.clone()).await.expect("lock"));
        assert!(!storage.lock(key.clone()).await.expect("lock"));
        assert!(storage.is_locked("abc").await);

        storage.unlock(key.clone()).await.expect("unlock");
        assert!(!storage.is_locked("abc").await);
        assert!(storage.lock(key).await.expect("lock"));
    }

    #[tokio::test]
    async fn unlock_without_lock_is_a_noop() {
        let storage = InMemoryStorage::new();
        storage
            .unlock(IdempotencyKey::new("abc"))
            .await
            .expect("unlock");
        assert!(!storage.is_locked("abc").await);
    }

    #[tokio::test]
    async fn read_returns_what_write_stored() {
        let storage = InMemoryStorage::new();
        let key = IdempotencyKey::new("abc");

        assert_eq!(storage.read(key.clone()).await.expect("read"), None);
        storage
            .write(key.clone(), b"bytes".to_vec())
            .await
            .expect("write");
        assert_eq!(
            storage.read(key).await.expect("read"),
            Some(b"bytes".to_vec())
        );
    }

    #[tokio::test]
    async fn failing_storage_fails_everything() {
        let storage: Arc<dyn Storage> = Arc::new(FailingStorage::new("down"));
        let key = IdempotencyKey::new("abc");

        assert!(storage.lock(key.clone()).await.is_err());
        assert!(storage.unlock(key.clone()).await.is_err());
        assert!(storage.read(key.clone()).await.is_err());
        assert!(storage.write(key, vec![]).await.is_err());
    }

    #[test]
    fn counting_operation_counts() {
        let operation =
            CountingOperation::new(200, Headers::new(), ResponseBody::Whole(b"ok".to_vec()));

        assert_eq!(operation.calls(), 0);
        let (status, _, body) = operation.run();
        assert_eq!(status, 200);
        assert_eq!(body.into_chunks(), vec![b"ok".to_vec()]);
        assert_eq!(operation.calls(), 1);
    }

    #[test]
    fn recording_notifier_records_in_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify(ReplayAction::Detected, &IdempotencyKey::new("a"));
        notifier.notify(ReplayAction::Detected, &IdempotencyKey::new("b"));

        assert_eq!(notifier.detection_count(), 2);
        assert_eq!(
            notifier.notifications(),
            vec![
                (ReplayAction::Detected, "a".to_string()),
                (ReplayAction::Detected, "b".to_string()),
            ]
        );
    }
}
