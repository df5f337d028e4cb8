//! The request coordinator - owner of the idempotency protocol.
//!
//! This module implements the key lifecycle around a protected operation:
//! lock acquisition and release, cached-response lookup with
//! payload-consistency verification, and the decision of when to persist a
//! result versus discard it.
//!
//! # Control Flow
//!
//! ```text
//! ┌──────────────────┐
//! │ request arrives  │
//! │ (key, payload)   │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐     false
//! │  lock(key)       │────────────► wait or fail fast
//! └────────┬─────────┘              (Storage's policy)
//!          │ true
//!          ▼
//! ┌──────────────────┐  Cached    ┌────────────────────┐
//! │ read(key, body)  │───────────►│ replay stored      │
//! │                  │  Conflict  │ response / fixed   │
//! │                  │───────────►│ 400, skip the op   │
//! └────────┬─────────┘            └────────────────────┘
//!          │ NoRecord
//!          ▼
//! ┌──────────────────┐
//! │ run operation    │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐  status in [200,226]: persist record, keep lock
//! │ write(outcome)   │
//! │                  │  otherwise: unlock, persist nothing
//! └──────────────────┘
//! ```
//!
//! # State Machine
//!
//! Per key, observed through storage (never held in memory here):
//!
//! `unlocked → locked (on lock) → { recorded (on write success) | unlocked
//! (on write failure or explicit unlock) }`
//!
//! `recorded` is terminal: a stored success is never invalidated or
//! re-executed. The lock is deliberately not released on the success path -
//! the committed record is what gates later submissions, and backends expire
//! abandoned locks on their own schedule.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use idempotent_request_core::coordinator::{ReadOutcome, RequestCoordinator};
//! use idempotent_request_core::key::IdempotencyKey;
//! use idempotent_request_core::record::{CapturedResponse, Headers, ResponseBody};
//!
//! async fn handle(
//!     coordinator: &RequestCoordinator,
//!     key: IdempotencyKey,
//!     payload: &[u8],
//! ) -> Result<CapturedResponse, Box<dyn std::error::Error>> {
//!     coordinator.lock(key.clone()).await?;
//!
//!     match coordinator.read(key.clone(), payload).await? {
//!         ReadOutcome::Cached(response) | ReadOutcome::Conflict(response) => {
//!             return Ok(response); // operation must not run
//!         }
//!         ReadOutcome::NoRecord => {}
//!     }
//!
//!     let outcome = run_payment().await; // the protected operation
//!     let response = coordinator
//!         .write(key, outcome.0, outcome.1, ResponseBody::Whole(outcome.2), payload)
//!         .await?;
//!     Ok(response)
//! }
//! # async fn run_payment() -> (u16, Headers, Vec<u8>) { (200, Headers::new(), vec![]) }
//! ```

use crate::key::IdempotencyKey;
use crate::notifier::{Notifier, ReplayAction};
use crate::record::{CapturedResponse, Headers, ResponseBody, StoredRecord};
use crate::storage::{Storage, StorageError};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the coordinator's `read` path.
///
/// The normal decision outcomes (cache hit, cache miss, conflict) are not
/// errors; they are [`ReadOutcome`] variants. Errors here mean the backend
/// failed or handed back bytes that do not decode as a record.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The storage backend failed; fatal for the current attempt.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Storage returned bytes that do not match the record schema.
    #[error(transparent)]
    Record(#[from] crate::record::RecordError),
}

/// Outcome of checking a key for prior activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No record exists; first attempt for this key. The caller proceeds to
    /// execute the operation (after having acquired the lock).
    NoRecord,

    /// The key was reused with a different request payload. Carries the
    /// fixed 400 response the caller must surface verbatim; never retried
    /// automatically.
    Conflict(CapturedResponse),

    /// A matching success record exists. Carries the recorded response; the
    /// caller must return it and must NOT re-execute the operation.
    Cached(CapturedResponse),
}

/// Build the fixed response returned when a key is reused with a different
/// request body.
///
/// The exact status, content type, and body are a compatibility contract
/// with existing clients and must not drift.
#[must_use]
pub fn conflict_response() -> CapturedResponse {
    let mut headers = Headers::new();
    headers.insert(
        "Content-Type".to_string(),
        "application/json; charset=utf-8".to_string(),
    );
    let body = serde_json::json!({
        "error": "Request inconsistent with the supplied idempotent key",
    });
    CapturedResponse {
        status: 400,
        headers,
        body: vec![body.to_string().into_bytes()],
    }
}

/// Owner of the idempotency protocol: `lock`, `unlock`, `read`, `write`.
///
/// The coordinator holds no per-key state and caches nothing across calls;
/// every decision reads fresh from the [`Storage`] backend, which is also
/// solely responsible for mutual exclusion. One coordinator instance can
/// therefore be shared across all request-handling tasks.
pub struct RequestCoordinator {
    storage: Arc<dyn Storage>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RequestCoordinator {
    /// Create a coordinator over the given storage backend, with no
    /// notifier.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            notifier: None,
        }
    }

    /// Attach a notifier informed whenever a replay is detected.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Acquire the per-key lock. Pass-through to [`Storage::lock`]: blocking
    /// versus fail-fast semantics and any retry policy belong to the
    /// backend.
    ///
    /// Must be called before the protected operation begins.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] unchanged.
    pub async fn lock(&self, key: IdempotencyKey) -> Result<bool, StorageError> {
        let acquired = self.storage.lock(key.clone()).await?;
        if acquired {
            tracing::debug!(key = %key, "acquired idempotency lock");
        } else {
            tracing::debug!(key = %key, "idempotency lock contended");
        }
        Ok(acquired)
    }

    /// Release the per-key lock without writing a result.
    ///
    /// Called internally by [`write`](Self::write) when the outcome is not a
    /// success, and directly by the caller if the operation aborts before
    /// producing any result - a failed attempt must never permanently block
    /// retries.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] unchanged.
    pub async fn unlock(&self, key: IdempotencyKey) -> Result<(), StorageError> {
        self.storage.unlock(key.clone()).await?;
        tracing::debug!(key = %key, "released idempotency lock");
        Ok(())
    }

    /// Check `key` for prior activity and verify payload consistency.
    ///
    /// `payload` is the current request's raw body, captured by the caller
    /// without consuming any shared stream (both this comparison and the
    /// operation itself need an intact copy).
    ///
    /// When a record exists, the notifier fires with
    /// [`ReplayAction::Detected`] before the payload comparison, so it
    /// observes every duplicate submission, match or conflict.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Storage`]: The backend read failed
    /// - [`CoordinatorError::Record`]: The stored bytes are malformed
    pub async fn read(
        &self,
        key: IdempotencyKey,
        payload: &[u8],
    ) -> Result<ReadOutcome, CoordinatorError> {
        let Some(bytes) = self.storage.read(key.clone()).await? else {
            return Ok(ReadOutcome::NoRecord);
        };

        let record = StoredRecord::decode(&bytes)?;

        if let Some(notifier) = &self.notifier {
            notifier.notify(ReplayAction::Detected, &key);
        }

        if !record.matches_payload(payload) {
            tracing::warn!(key = %key, "idempotency key reused with a different payload");
            return Ok(ReadOutcome::Conflict(conflict_response()));
        }

        tracing::debug!(key = %key, status = record.status, "replaying cached response");
        Ok(ReadOutcome::Cached(record.into_response()))
    }

    /// Record the outcome of the protected operation.
    ///
    /// Called exactly once per executed attempt, after the operation has
    /// produced a result (never called when `read` returned `Cached`).
    ///
    /// - `status` in `[200, 226]`: persists a record with the normalized
    ///   headers, the body coerced into a chunk sequence, and
    ///   `post_data = payload`. The lock is deliberately NOT released; the
    ///   committed record is what prevents future re-execution.
    /// - Any other status: releases the lock and persists nothing, so a
    ///   later retry with the same key re-attempts from scratch.
    ///
    /// Returns the `(status, headers, body)` triple unchanged in all cases -
    /// `write` is an observing side effect, not a transform.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError`] unchanged. Record encoding failures
    /// surface as [`CoordinatorError::Record`].
    pub async fn write(
        &self,
        key: IdempotencyKey,
        status: u16,
        headers: Headers,
        body: ResponseBody,
        payload: &[u8],
    ) -> Result<CapturedResponse, CoordinatorError> {
        let response = CapturedResponse::new(status, headers, body);

        if response.is_success() {
            let record = StoredRecord::from_response(response.clone(), payload);
            self.storage.write(key.clone(), record.encode()?).await?;
            tracing::debug!(key = %key, status, "persisted idempotency record");
        } else {
            self.unlock(key.clone()).await?;
            tracing::debug!(key = %key, status, "attempt failed, key is retryable");
        }

        Ok(response)
    }
}
