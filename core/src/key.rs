//! Idempotency key type.
//!
//! This module defines the strong type for the client-supplied identifier
//! (`IdempotencyKey`) that scopes at-most-once execution of an operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `IdempotencyKey` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid idempotency key: {0}")]
pub struct ParseKeyError(String);

/// Client-supplied identifier scoping "at most once" execution of an operation.
///
/// A key uniquely identifies a single logical operation instance. The core
/// never generates keys; it receives them already resolved from the request.
/// For example:
/// - `"payment-12345"`
/// - `"order-abc-def"`
/// - a client-generated UUID
///
/// # Design
///
/// `IdempotencyKey` is a newtype wrapper around `String` that provides:
/// - Type safety (can't accidentally use a regular string)
/// - Clear intent in function signatures
/// - Serialization support for storage backends that persist keys
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// Use `FromStr` when parsing external/user input. Use `new()` or `From` when
/// constructing keys from application-controlled data.
///
/// # Examples
///
/// ```
/// use idempotent_request_core::key::IdempotencyKey;
///
/// let key = IdempotencyKey::new("payment-12345");
/// assert_eq!(key.as_str(), "payment-12345");
///
/// let parsed: IdempotencyKey = "order-abc".parse().unwrap();
/// assert_eq!(parsed, IdempotencyKey::new("order-abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Create a new `IdempotencyKey` from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use idempotent_request_core::key::IdempotencyKey;
    ///
    /// let key = IdempotencyKey::new("payment-123");
    /// ```
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    ///
    /// # Examples
    ///
    /// ```
    /// use idempotent_request_core::key::IdempotencyKey;
    ///
    /// let key = IdempotencyKey::new("payment-123");
    /// assert_eq!(key.as_str(), "payment-123");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `IdempotencyKey` into its inner `String`.
    ///
    /// # Examples
    ///
    /// ```
    /// use idempotent_request_core::key::IdempotencyKey;
    ///
    /// let key = IdempotencyKey::new("payment-123");
    /// let string = key.into_inner();
    /// assert_eq!(string, "payment-123");
    /// ```
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseKeyError(
                "Idempotency key cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
