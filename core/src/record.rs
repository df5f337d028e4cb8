//! Stored record types for the idempotency protocol.
//!
//! This module defines the persisted value associated with an idempotency key
//! (`StoredRecord`), the response triple handed back to callers
//! (`CapturedResponse`), and the explicit body union resolved before
//! persistence (`ResponseBody`).
//!
//! # Wire Format
//!
//! Records are serialized with `serde_json` into a self-describing object:
//!
//! ```json
//! {"status": 200, "headers": {...}, "response": [[...]], "post_data": [...]}
//! ```
//!
//! The field names are a storage contract shared with any other reader of the
//! backend; byte fields (`response` chunks, `post_data`) round-trip exactly.
//! Decoding validates the fixed schema and rejects malformed records instead
//! of silently returning empty fields.
//!
//! # Invariants
//!
//! - A `StoredRecord` exists for a key if and only if the first operation for
//!   that key completed with a status in the success range `[200, 226]`.
//! - Once written, the record for a key is immutable; no update path exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Status codes whose responses are persisted and replayed.
///
/// Anything outside this range is treated as a failed attempt: nothing is
/// stored and the per-key lock is released so the client may retry.
pub const SUCCESS_RANGE: RangeInclusive<u16> = 200..=226;

/// Error types for record encoding and decoding.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Failed to serialize a record to bytes.
    #[error("Failed to encode stored record: {0}")]
    Encode(String),

    /// The raw bytes in storage do not match the record schema.
    #[error("Malformed stored record: {0}")]
    Malformed(String),
}

/// Response metadata carried alongside the status and body.
///
/// Headers are normalized into a sorted map so that encoding is deterministic
/// regardless of the order the caller produced them in.
pub type Headers = BTreeMap<String, String>;

/// Response payload resolved by the caller before persistence.
///
/// The body of the protected operation may arrive either as an already-chunked
/// sequence (the shape most HTTP stacks hand back) or as a single buffered
/// byte string. Callers resolve which shape they have; the record stores both
/// as an ordered chunk sequence.
///
/// # Examples
///
/// ```
/// use idempotent_request_core::record::ResponseBody;
///
/// let chunked = ResponseBody::Chunks(vec![b"ok".to_vec()]);
/// let buffered = ResponseBody::Whole(b"ok".to_vec());
///
/// assert_eq!(chunked.into_chunks(), buffered.into_chunks());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseBody {
    /// An ordered sequence of body chunks, stored as-is.
    Chunks(Vec<Vec<u8>>),
    /// A single buffered body, stored as one chunk.
    Whole(Vec<u8>),
}

impl ResponseBody {
    /// Coerce the body into the chunk sequence persisted in the record.
    #[must_use]
    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        match self {
            Self::Chunks(chunks) => chunks,
            Self::Whole(bytes) => vec![bytes],
        }
    }
}

/// The `(status, headers, body)` triple observed by callers.
///
/// Returned by `read` on a cache hit, echoed back unchanged by `write`, and
/// produced as the fixed conflict response when a key is reused with a
/// different request payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedResponse {
    /// Result/status code of the operation.
    pub status: u16,
    /// Normalized response metadata.
    pub headers: Headers,
    /// Response payload as an ordered chunk sequence.
    pub body: Vec<Vec<u8>>,
}

impl CapturedResponse {
    /// Create a response triple from its parts.
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body: body.into_chunks(),
        }
    }

    /// Whether this response falls in the persistable success range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        SUCCESS_RANGE.contains(&self.status)
    }
}

impl fmt::Display for CapturedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size: usize = self.body.iter().map(Vec::len).sum();
        write!(
            f,
            "CapturedResponse {{ status: {}, body: {} bytes in {} chunks }}",
            self.status,
            size,
            self.body.len()
        )
    }
}

/// Persisted value associated with an idempotency key.
///
/// Holds everything needed to replay the first successful response verbatim
/// (`status`, `headers`, `response`) plus the exact bytes of the original
/// request payload (`post_data`) for later consistency checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredRecord {
    /// Result/status code of the completed operation.
    pub status: u16,
    /// Normalized response metadata.
    pub headers: Headers,
    /// Response payload as an ordered chunk sequence.
    pub response: Vec<Vec<u8>>,
    /// The exact bytes of the original request payload (the fingerprint).
    pub post_data: Vec<u8>,
}

impl StoredRecord {
    /// Build a record from a response triple and the request payload it
    /// answered.
    #[must_use]
    pub fn from_response(response: CapturedResponse, payload: &[u8]) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            response: response.body,
            post_data: payload.to_vec(),
        }
    }

    /// Whether the current request payload matches the fingerprint stored
    /// with the first request. Comparison is byte-for-byte.
    #[must_use]
    pub fn matches_payload(&self, payload: &[u8]) -> bool {
        self.post_data == payload
    }

    /// Split the record back into the response triple it replays.
    #[must_use]
    pub fn into_response(self) -> CapturedResponse {
        CapturedResponse {
            status: self.status,
            headers: self.headers,
            body: self.response,
        }
    }

    /// Serialize this record to its storage encoding.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Encode` if serialization fails. This is rare:
    /// every field of the record maps directly onto JSON.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        serde_json::to_vec(self).map_err(|e| RecordError::Encode(e.to_string()))
    }

    /// Deserialize a record from its storage encoding.
    ///
    /// The schema is fixed: all four fields must be present with the right
    /// types, and unknown fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Malformed` if the bytes are not a valid record.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        serde_json::from_slice(bytes).map_err(|e| RecordError::Malformed(e.to_string()))
    }
}
