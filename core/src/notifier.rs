//! Notifier trait for replay observability.
//!
//! The coordinator can be wired with an optional callback that fires whenever
//! a stored record is found for a key, i.e. on any duplicate submission. The
//! event fires for both outcomes of the payload comparison - a verbatim
//! replay and a payload conflict - so it can drive duplicate-detection
//! metrics without caring which way the comparison went.
//!
//! The notifier is injected once at coordinator construction with a fixed
//! method signature; there is no per-call construction or dynamic dispatch
//! beyond the trait object itself.

use crate::key::IdempotencyKey;
use std::fmt;

/// The action reported to a [`Notifier`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReplayAction {
    /// A stored record was found for the submitted key.
    Detected,
}

impl fmt::Display for ReplayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected => write!(f, "detected"),
        }
    }
}

/// Callback invoked when a replay is detected.
///
/// Implementations must be `Send + Sync`; the coordinator may be shared
/// across request-handling tasks. Notification is fire-and-forget: the
/// coordinator ignores nothing it returns because it returns nothing, and a
/// slow notifier delays the request it fires on, so implementations should
/// hand off expensive work.
///
/// # Example
///
/// ```
/// use idempotent_request_core::key::IdempotencyKey;
/// use idempotent_request_core::notifier::{Notifier, ReplayAction};
///
/// struct LogNotifier;
///
/// impl Notifier for LogNotifier {
///     fn notify(&self, action: ReplayAction, key: &IdempotencyKey) {
///         tracing::info!(%action, %key, "duplicate submission");
///     }
/// }
/// ```
pub trait Notifier: Send + Sync {
    /// Report `action` for `key`.
    fn notify(&self, action: ReplayAction, key: &IdempotencyKey);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_display_matches_wire_name() {
        assert_eq!(format!("{}", ReplayAction::Detected), "detected");
    }
}
