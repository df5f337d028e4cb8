//! # Idempotent Request Core
//!
//! Core traits and types for request-level idempotency.
//!
//! This crate lets a service safely accept retries of a side-effecting
//! operation (a payment, an order submission) by attaching a client-supplied
//! idempotency key to the request. It guarantees:
//!
//! - A given key's side effect executes, and its response is captured, at
//!   most once
//! - Concurrent or repeated requests carrying the same key while the first
//!   is in flight are serialized via a per-key lock, not re-executed
//! - A retried request is compared byte-for-byte against the first request's
//!   payload and rejected with a fixed 400 response if it differs (key reuse
//!   with different intent)
//! - Once a success record exists, it is replayed verbatim without
//!   re-invoking the underlying operation
//!
//! ## Core Concepts
//!
//! - **[`IdempotencyKey`]**: Opaque, client-supplied identifier scoping
//!   "at most once" execution
//! - **[`RequestCoordinator`]**: Owner of the protocol - `lock`, `unlock`,
//!   `read`, `write`
//! - **[`Storage`]**: Injected backend providing per-key locking plus
//!   read/write of opaque record bytes
//! - **[`Notifier`]**: Optional callback informed of every duplicate
//!   submission
//! - **[`StoredRecord`]**: The immutable persisted response plus the request
//!   fingerprint it answered
//!
//! ## Architecture Principles
//!
//! - The coordinator holds no shared mutable state and performs no internal
//!   locking; concurrency control is entirely the storage backend's job
//! - Decision outcomes (cache hit, cache miss, conflict) are values, not
//!   errors; storage failures propagate unchanged
//! - Dependency injection via traits, dyn-compatible for `Arc<dyn _>` use
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use idempotent_request_core::{
//!     IdempotencyKey, ReadOutcome, RequestCoordinator, ResponseBody,
//! };
//! # use idempotent_request_core::{Headers, Storage};
//! # async fn example(
//! #     storage: Arc<dyn Storage>,
//! #     run_payment: impl AsyncFn() -> (u16, Headers, Vec<u8>),
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = RequestCoordinator::new(storage);
//! let key = IdempotencyKey::new("payment-123");
//! let payload = br#"{"amount":10}"#;
//!
//! coordinator.lock(key.clone()).await?;
//! match coordinator.read(key.clone(), payload).await? {
//!     ReadOutcome::Cached(_) | ReadOutcome::Conflict(_) => {
//!         // replay (or reject) without running the operation
//!         return Ok(());
//!     }
//!     ReadOutcome::NoRecord => {}
//! }
//!
//! let (status, headers, body) = run_payment().await;
//! coordinator
//!     .write(key, status, headers, ResponseBody::Whole(body), payload)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod key;
pub mod notifier;
pub mod record;
pub mod storage;

// Re-export commonly used types
pub use coordinator::{conflict_response, CoordinatorError, ReadOutcome, RequestCoordinator};
pub use key::IdempotencyKey;
pub use notifier::{Notifier, ReplayAction};
pub use record::{
    CapturedResponse, Headers, RecordError, ResponseBody, StoredRecord, SUCCESS_RANGE,
};
pub use storage::{Storage, StorageError};
