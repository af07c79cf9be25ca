//! Per-request negotiation errors.
//!
//! None of these reach the HTTP client as-is: the engine logs the detail and
//! degrades every variant to a 401 re-challenge, preserving the client's
//! ability to retry with different credentials or a different scheme.

use sspi_gateway_sdk::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The `Authorization` header could not be parsed (bad base64, missing
    /// `user:password` separator, truncated token).
    #[error("malformed authorization header: {0}")]
    MalformedHeader(String),

    /// The backend refused to hand out a server credentials handle.
    #[error("credentials acquisition failed")]
    CredentialAcquisition(#[source] BackendError),

    /// The backend rejected the client token mid-handshake.
    #[error("negotiation failed")]
    Negotiation(#[source] BackendError),

    /// Any other backend failure.
    #[error("backend failure")]
    Backend(#[source] BackendError),
}
