//! Storage trait for the idempotency protocol's backend.
//!
//! This module defines the core abstraction for a storage backend - a
//! key-value store that provides per-key mutual exclusion plus read/write of
//! opaque record bytes.
//!
//! # Design
//!
//! The `Storage` trait is deliberately minimal and focused. It provides
//! exactly what the coordinator needs:
//!
//! - Acquire and release a per-key lock
//! - Read the raw record bytes for a key
//! - Write raw record bytes for a key
//!
//! All concurrency control lives here. The coordinator holds no shared
//! mutable state and performs no internal locking; correctness depends on
//! the backend enforcing mutual exclusion at `lock` time and read-after-write
//! visibility for `read`. Suitable backends include a distributed mutex
//! (e.g. Redis `SET NX`) or a database conditional write.
//!
//! # Implementations
//!
//! - `InMemoryStorage` (in `idempotent-request-testing` crate): Fast,
//!   deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use idempotent_request_core::storage::{Storage, StorageError};
//! use idempotent_request_core::key::IdempotencyKey;
//!
//! async fn example<S: Storage>(storage: &S) -> Result<(), StorageError> {
//!     let key = IdempotencyKey::new("payment-123");
//!
//!     if storage.lock(key.clone()).await? {
//!         // run the protected operation, then persist its outcome
//!         storage.write(key, b"{...}".to_vec()).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::key::IdempotencyKey;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during storage operations.
///
/// The coordinator adds no timeout or retry wrapper of its own; these errors
/// propagate unchanged to the caller, who should treat them as fatal for the
/// current request attempt.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("Storage operation failed: {0}")]
    Backend(String),
}

/// Key-value backend providing per-key locking plus read/write of opaque
/// record bytes.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: multiple requests carrying the
/// same key may call into storage concurrently from independent execution
/// contexts (threads, processes, or machines).
///
/// # Locking Policy
///
/// Whether `lock` blocks until the key is free or fails fast on contention
/// is the implementation's choice, as are any retry/backoff and lock-expiry
/// policies. In particular, locks held for keys that completed successfully
/// are never released by the coordinator; backends that cannot tolerate
/// abandoned locks must expire them on their own schedule. The committed
/// record, not the lock, is what gates replayed requests.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
/// `async fn` to enable trait object usage (`Arc<dyn Storage>`), which is
/// how the coordinator holds its backend.
pub trait Storage: Send + Sync {
    /// Acquire mutual exclusion for `key`.
    ///
    /// Returns `true` if the lock was acquired and `false` if another
    /// request currently holds it. Must be called before the protected
    /// operation begins so a concurrent duplicate observes the lock and can
    /// wait or fail fast per this backend's policy.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: The backend could not be reached
    /// - `Backend`: The lock operation itself failed
    fn lock(
        &self,
        key: IdempotencyKey,
    ) -> Pin<Box<dyn Future<Output = Result<bool, StorageError>> + Send + '_>>;

    /// Release the lock for `key` without writing a result.
    ///
    /// Releasing a key that is not locked is a no-op.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: The backend could not be reached
    /// - `Backend`: The unlock operation itself failed
    fn unlock(
        &self,
        key: IdempotencyKey,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;

    /// Fetch the raw persisted record bytes for `key`.
    ///
    /// Returns `None` if no record exists (not an error - every key starts
    /// without one).
    ///
    /// # Errors
    ///
    /// - `Unavailable`: The backend could not be reached
    /// - `Backend`: The read operation itself failed
    fn read(
        &self,
        key: IdempotencyKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, StorageError>> + Send + '_>>;

    /// Persist raw record bytes for `key`.
    ///
    /// The coordinator writes a key at most once; records are immutable once
    /// stored.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: The backend could not be reached
    /// - `Backend`: The write operation itself failed
    fn write(
        &self,
        key: IdempotencyKey,
        record: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}
