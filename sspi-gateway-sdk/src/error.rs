//! Error types for security backend implementations.

use thiserror::Error;

/// Errors reported by a [`crate::SecurityBackend`].
///
/// The gateway never forwards the message text to HTTP clients; it is logged
/// internally and degraded to a generic re-challenge.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested security package is not installed or not supported.
    #[error("unknown security package: {0}")]
    UnknownPackage(String),

    /// The backend refused to hand out a credentials handle.
    #[error("credentials acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// The client token was malformed, replayed, or failed validation.
    #[error("security token rejected: {0}")]
    InvalidToken(String),

    /// Explicit-credentials logon was denied.
    #[error("logon denied for '{user}'")]
    LogonDenied { user: String },

    /// An unexpected backend failure.
    #[error("internal backend error: {0}")]
    Internal(String),
}
