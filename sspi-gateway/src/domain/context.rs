//! Scoped wrappers for the backend's native handles.
//!
//! Both types follow the same ownership rule: the constructor acquires the
//! native resource and the single disposal path (`Drop`) releases it. The
//! handles are moved, never duplicated, so double release and
//! release-without-acquire are unrepresentable.

use std::sync::Arc;

use sspi_gateway_sdk::{
    AcceptOutcome, BackendError, RawCredentialsHandle, RawSecurityContext, SecurityBackend,
    WindowsIdentity,
};

use crate::domain::error::AuthError;

/// Server-side credentials handle scoped to one negotiation attempt.
pub struct CredentialsHandle {
    backend: Arc<dyn SecurityBackend>,
    raw: Option<RawCredentialsHandle>,
    package: String,
}

impl CredentialsHandle {
    /// Acquire a handle for a security package (`"Negotiate"`, `"NTLM"`).
    pub fn acquire(backend: Arc<dyn SecurityBackend>, package: &str) -> Result<Self, AuthError> {
        let raw = backend
            .acquire_credentials_handle(package)
            .map_err(AuthError::CredentialAcquisition)?;
        Ok(Self {
            backend,
            raw: Some(raw),
            package: package.to_owned(),
        })
    }

    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    fn accept(
        &self,
        context: Option<RawSecurityContext>,
        input: Option<&[u8]>,
    ) -> Result<AcceptOutcome, BackendError> {
        match &self.raw {
            Some(raw) => self.backend.accept_security_context(raw, context, input),
            None => Err(BackendError::Internal(
                "credentials handle already released".to_owned(),
            )),
        }
    }
}

impl Drop for CredentialsHandle {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.backend.free_credentials_handle(raw);
        }
    }
}

/// One in-flight handshake with the backend.
///
/// Owns its [`CredentialsHandle`]; each [`step`](SecurityContext::step)
/// advances the protocol by exactly one round. Dropping the context deletes
/// the backend context and releases the credentials, on success and failure
/// paths alike.
pub struct SecurityContext {
    backend: Arc<dyn SecurityBackend>,
    credentials: CredentialsHandle,
    raw: Option<RawSecurityContext>,
    token: Vec<u8>,
    complete: bool,
}

impl SecurityContext {
    /// Acquire credentials for `package` and prepare an empty context.
    pub fn new(backend: Arc<dyn SecurityBackend>, package: &str) -> Result<Self, AuthError> {
        let credentials = CredentialsHandle::acquire(Arc::clone(&backend), package)?;
        Ok(Self {
            backend,
            credentials,
            raw: None,
            token: Vec::new(),
            complete: false,
        })
    }

    #[must_use]
    pub fn package(&self) -> &str {
        self.credentials.package()
    }

    /// Most recent output token to relay to the client.
    #[must_use]
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Advance the handshake by one round.
    ///
    /// `input` is `None` only on the very first call, when the server speaks
    /// first. Returns the completion flag; on completion the identity is
    /// available via [`identity`](SecurityContext::identity). A rejected
    /// token fails with [`AuthError::Negotiation`] and leaves the backend
    /// context torn down — the caller restarts the handshake from scratch.
    pub fn step(&mut self, input: Option<&[u8]>) -> Result<bool, AuthError> {
        let context = self.raw.take();
        let outcome = self.credentials.accept(context, input).map_err(|e| match e {
            BackendError::InvalidToken(_) => AuthError::Negotiation(e),
            other => AuthError::Backend(other),
        })?;
        self.raw = Some(outcome.context);
        self.token = outcome.token;
        self.complete = outcome.complete;
        Ok(self.complete)
    }

    /// Identity resolved by a completed handshake.
    pub fn identity(&self) -> Result<WindowsIdentity, AuthError> {
        match &self.raw {
            Some(raw) if self.complete => {
                self.backend.context_identity(raw).map_err(AuthError::Backend)
            }
            _ => Err(AuthError::Backend(BackendError::Internal(
                "identity queried on an incomplete context".to_owned(),
            ))),
        }
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.backend.delete_security_context(raw);
        }
        // credentials handle released by its own Drop
    }
}

// `SecurityBackend` is not `Debug`, so the trait-object field rules out a
// derive; format the observable state and omit the backend handle.
impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("package", &self.credentials.package())
            .field("token_len", &self.token.len())
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}
