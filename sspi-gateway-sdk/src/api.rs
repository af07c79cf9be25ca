//! Backend capability trait consumed by the negotiation engine.
//!
//! The trait mirrors the server-side SSPI call sequence: acquire a
//! credentials handle for a security package, feed client tokens through
//! `AcceptSecurityContext` one round at a time, query the resolved identity,
//! and free the native handles. Calls are synchronous — the underlying
//! provider is blocking FFI and one negotiation round executes within the
//! handling of one request.

use crate::error::BackendError;
use crate::models::WindowsIdentity;

/// Opaque server-side credentials handle.
///
/// Moved (never copied) into exactly one
/// [`free_credentials_handle`](SecurityBackend::free_credentials_handle)
/// call; the wrapper types in the gateway enforce the single-release rule.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RawCredentialsHandle(pub u64);

/// Opaque acceptor security context handle for one in-flight handshake.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RawSecurityContext(pub u64);

/// Result of one `accept_security_context` round.
#[derive(Debug)]
pub struct AcceptOutcome {
    /// Context handle to pass back on the next round (and to free).
    pub context: RawSecurityContext,
    /// Token to relay to the client. May be empty on the final round.
    pub token: Vec<u8>,
    /// True once the handshake finished and the identity can be queried.
    pub complete: bool,
}

/// Reverts impersonation when dropped.
///
/// Returned by [`SecurityBackend::impersonate`]; the calling thread runs
/// under the impersonated identity until the value is dropped.
pub trait ImpersonationContext: Send {}

/// The OS identity/credential provider.
///
/// Implemented over native SSPI on Windows hosts and by
/// [`crate::mock::MockSecurityBackend`] in tests.
pub trait SecurityBackend: Send + Sync {
    /// Acquire a server credentials handle for a security package
    /// (`"Negotiate"`, `"NTLM"`).
    fn acquire_credentials_handle(
        &self,
        package: &str,
    ) -> Result<RawCredentialsHandle, BackendError>;

    /// Advance the server side of a handshake by exactly one round.
    ///
    /// `context` is `None` on the first round of a handshake; `input` is
    /// `None` only when the server speaks first (initial challenge).
    fn accept_security_context(
        &self,
        credentials: &RawCredentialsHandle,
        context: Option<RawSecurityContext>,
        input: Option<&[u8]>,
    ) -> Result<AcceptOutcome, BackendError>;

    /// Resolve the identity bound to a completed context.
    fn context_identity(
        &self,
        context: &RawSecurityContext,
    ) -> Result<WindowsIdentity, BackendError>;

    /// Release a credentials handle. Consumes the handle; at most one call
    /// per acquired handle.
    fn free_credentials_handle(&self, credentials: RawCredentialsHandle);

    /// Delete a security context. Consumes the handle.
    fn delete_security_context(&self, context: RawSecurityContext);

    /// Network logon with explicit credentials (HTTP Basic).
    fn logon_user(&self, username: &str, password: &str)
    -> Result<WindowsIdentity, BackendError>;

    /// Run subsequent work on the calling thread as `identity` until the
    /// returned context is dropped.
    fn impersonate(
        &self,
        identity: &WindowsIdentity,
    ) -> Result<Box<dyn ImpersonationContext>, BackendError>;
}
