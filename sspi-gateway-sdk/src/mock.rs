//! Scriptable in-memory security backend.
//!
//! Drives the gateway test-suites and demos on any platform: handshakes
//! complete after a configurable number of challenge rounds, explicit
//! credentials are validated against a fixture account table, and every
//! native-handle acquire/release is counted so tests can assert that no
//! resource leaks across success, reject, and abandonment paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::{
    AcceptOutcome, ImpersonationContext, RawCredentialsHandle, RawSecurityContext, SecurityBackend,
};
use crate::error::BackendError;
use crate::models::{SecurityIdentifier, WindowsAccount, WindowsIdentity};

/// Account fixture for `logon_user`.
#[derive(Debug, Clone)]
struct MockAccount {
    password: String,
    identity: WindowsIdentity,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    live_credentials: HashSet<u64>,
    /// Context handle -> rounds advanced so far.
    contexts: HashMap<u64, usize>,
    completed: HashSet<u64>,
    credentials_acquired: usize,
    credentials_released: usize,
    contexts_deleted: usize,
    impersonations_active: usize,
    impersonations_total: usize,
}

/// Deterministic [`SecurityBackend`] for tests.
pub struct MockSecurityBackend {
    state: Arc<Mutex<State>>,
    accounts: Mutex<HashMap<String, MockAccount>>,
    handshake_identity: Mutex<WindowsIdentity>,
    challenge_rounds: Mutex<usize>,
    mutual_token: Mutex<Option<Vec<u8>>>,
    rejected_token: Mutex<Option<Vec<u8>>>,
}

impl Default for MockSecurityBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSecurityBackend {
    /// Backend with one default account (`MOCK\user` / `password`) whose
    /// handshakes complete after a single challenge round.
    #[must_use]
    pub fn new() -> Self {
        let backend = Self {
            state: Arc::new(Mutex::new(State::default())),
            accounts: Mutex::new(HashMap::new()),
            handshake_identity: Mutex::new(default_identity()),
            challenge_rounds: Mutex::new(1),
            mutual_token: Mutex::new(None),
            rejected_token: Mutex::new(None),
        };
        backend.add_account("MOCK\\user", "password", default_identity());
        backend
    }

    /// Number of `Continue` rounds before a handshake completes.
    pub fn set_challenge_rounds(&self, rounds: usize) {
        *self.challenge_rounds.lock() = rounds;
    }

    /// Identity resolved by completed handshakes.
    pub fn set_handshake_identity(&self, identity: WindowsIdentity) {
        *self.handshake_identity.lock() = identity;
    }

    /// Final token returned alongside handshake completion (mutual auth).
    pub fn set_mutual_token(&self, token: Vec<u8>) {
        *self.mutual_token.lock() = Some(token);
    }

    /// Make `accept_security_context` fail for this exact input token.
    pub fn set_rejected_token(&self, token: Vec<u8>) {
        *self.rejected_token.lock() = Some(token);
    }

    /// Register an account for `logon_user`.
    pub fn add_account(&self, fqn: &str, password: &str, identity: WindowsIdentity) {
        self.accounts.lock().insert(
            fqn.to_owned(),
            MockAccount {
                password: password.to_owned(),
                identity,
            },
        );
    }

    pub fn live_credentials(&self) -> usize {
        self.state.lock().live_credentials.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn credentials_acquired(&self) -> usize {
        self.state.lock().credentials_acquired
    }

    pub fn credentials_released(&self) -> usize {
        self.state.lock().credentials_released
    }

    pub fn contexts_deleted(&self) -> usize {
        self.state.lock().contexts_deleted
    }

    pub fn active_impersonations(&self) -> usize {
        self.state.lock().impersonations_active
    }

    pub fn total_impersonations(&self) -> usize {
        self.state.lock().impersonations_total
    }
}

impl SecurityBackend for MockSecurityBackend {
    fn acquire_credentials_handle(
        &self,
        package: &str,
    ) -> Result<RawCredentialsHandle, BackendError> {
        if package != "Negotiate" && package != "NTLM" {
            return Err(BackendError::UnknownPackage(package.to_owned()));
        }
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.live_credentials.insert(handle);
        state.credentials_acquired += 1;
        Ok(RawCredentialsHandle(handle))
    }

    fn accept_security_context(
        &self,
        credentials: &RawCredentialsHandle,
        context: Option<RawSecurityContext>,
        input: Option<&[u8]>,
    ) -> Result<AcceptOutcome, BackendError> {
        let challenge_rounds = *self.challenge_rounds.lock();
        let mut state = self.state.lock();
        if !state.live_credentials.contains(&credentials.0) {
            return Err(BackendError::Internal(
                "accept on a released credentials handle".to_owned(),
            ));
        }

        let handle = match context {
            Some(ctx) => ctx.0,
            None => {
                state.next_handle += 1;
                let handle = state.next_handle;
                state.contexts.insert(handle, 0);
                handle
            }
        };

        let poisoned = match (input, self.rejected_token.lock().as_ref()) {
            (Some(input), Some(rejected)) => input == rejected.as_slice(),
            _ => false,
        };
        if poisoned {
            // A failed accept tears the native context down on the provider
            // side; the caller must not free it again.
            state.contexts.remove(&handle);
            state.contexts_deleted += 1;
            return Err(BackendError::InvalidToken(
                "token validation failed".to_owned(),
            ));
        }

        let rounds = {
            let entry = state.contexts.entry(handle).or_insert(0);
            *entry += 1;
            *entry
        };

        let complete = rounds > challenge_rounds;
        let token = if complete {
            state.completed.insert(handle);
            self.mutual_token.lock().clone().unwrap_or_default()
        } else {
            format!("mock-challenge-{rounds}").into_bytes()
        };

        Ok(AcceptOutcome {
            context: RawSecurityContext(handle),
            token,
            complete,
        })
    }

    fn context_identity(
        &self,
        context: &RawSecurityContext,
    ) -> Result<WindowsIdentity, BackendError> {
        let state = self.state.lock();
        if !state.completed.contains(&context.0) {
            return Err(BackendError::Internal(
                "identity queried on an incomplete context".to_owned(),
            ));
        }
        Ok(self.handshake_identity.lock().clone())
    }

    fn free_credentials_handle(&self, credentials: RawCredentialsHandle) {
        let mut state = self.state.lock();
        state.live_credentials.remove(&credentials.0);
        state.credentials_released += 1;
    }

    fn delete_security_context(&self, context: RawSecurityContext) {
        let mut state = self.state.lock();
        if state.contexts.remove(&context.0).is_some() {
            state.contexts_deleted += 1;
        }
        state.completed.remove(&context.0);
    }

    fn logon_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<WindowsIdentity, BackendError> {
        let accounts = self.accounts.lock();
        match accounts.get(username) {
            Some(account) if account.password == password => Ok(account.identity.clone()),
            _ => Err(BackendError::LogonDenied {
                user: username.to_owned(),
            }),
        }
    }

    fn impersonate(
        &self,
        _identity: &WindowsIdentity,
    ) -> Result<Box<dyn ImpersonationContext>, BackendError> {
        let mut state = self.state.lock();
        state.impersonations_active += 1;
        state.impersonations_total += 1;
        Ok(Box::new(MockImpersonation {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockImpersonation {
    state: Arc<Mutex<State>>,
}

impl ImpersonationContext for MockImpersonation {}

impl Drop for MockImpersonation {
    fn drop(&mut self) {
        self.state.lock().impersonations_active -= 1;
    }
}

/// Default fixture identity with two groups.
#[must_use]
pub fn default_identity() -> WindowsIdentity {
    WindowsIdentity::builder("MOCK\\user")
        .sid(SecurityIdentifier::from_string("S-1-5-21-100-200-300-1001"))
        .group(WindowsAccount::new(None, "Everyone", "S-1-1-0"))
        .group(WindowsAccount::new(
            Some("MOCK".to_owned()),
            "Users",
            "S-1-5-32-545",
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_completes_after_configured_rounds() {
        let backend = MockSecurityBackend::new();
        backend.set_challenge_rounds(2);

        let cred = backend.acquire_credentials_handle("Negotiate").unwrap();

        let step1 = backend
            .accept_security_context(&cred, None, Some(b"client-1"))
            .unwrap();
        assert!(!step1.complete);
        assert_eq!(step1.token, b"mock-challenge-1");

        let step2 = backend
            .accept_security_context(&cred, Some(step1.context), Some(b"client-2"))
            .unwrap();
        assert!(!step2.complete);

        let step3 = backend
            .accept_security_context(&cred, Some(step2.context), Some(b"client-3"))
            .unwrap();
        assert!(step3.complete);

        let identity = backend.context_identity(&step3.context).unwrap();
        assert_eq!(identity.fqn(), "MOCK\\user");

        backend.delete_security_context(step3.context);
        backend.free_credentials_handle(cred);
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_credentials(), 0);
    }

    #[test]
    fn unknown_package_is_refused() {
        let backend = MockSecurityBackend::new();
        let err = backend.acquire_credentials_handle("Digest").unwrap_err();
        assert!(matches!(err, BackendError::UnknownPackage(p) if p == "Digest"));
    }

    #[test]
    fn rejected_token_tears_down_the_context() {
        let backend = MockSecurityBackend::new();
        backend.set_rejected_token(b"poison".to_vec());

        let cred = backend.acquire_credentials_handle("NTLM").unwrap();
        let err = backend
            .accept_security_context(&cred, None, Some(b"poison"))
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidToken(_)));
        assert_eq!(backend.live_contexts(), 0);

        backend.free_credentials_handle(cred);
    }

    #[test]
    fn logon_checks_the_account_table() {
        let backend = MockSecurityBackend::new();
        assert!(backend.logon_user("MOCK\\user", "password").is_ok());
        assert!(backend.logon_user("MOCK\\user", "wrong").is_err());
        assert!(backend.logon_user("MOCK\\nobody", "password").is_err());
    }

    #[test]
    fn impersonation_reverts_on_drop() {
        let backend = MockSecurityBackend::new();
        let identity = default_identity();
        let guard = backend.impersonate(&identity).unwrap();
        assert_eq!(backend.active_impersonations(), 1);
        drop(guard);
        assert_eq!(backend.active_impersonations(), 0);
        assert_eq!(backend.total_impersonations(), 1);
    }
}
