//! The negotiation engine.
//!
//! Drives the per-session state machine `Unauthenticated → Challenging →
//! Authenticated` one round per request. A reject is never terminal: the
//! session falls back to `Challenging` with fresh state and the client may
//! retry with different credentials or a different scheme.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sspi_gateway_sdk::{SecurityBackend, WindowsIdentity};

use crate::config::{ConfigError, GatewayConfig};
use crate::domain::principal::{PrincipalFormat, WindowsPrincipal};
use crate::domain::providers::{ProviderOutcome, ProviderRegistry, SecurityProvider};
use crate::domain::session::{SessionKey, SessionStore, SlotState};

/// Result of one engine round, rendered onto the HTTP response by the
/// transport adapter.
#[derive(Debug)]
pub enum RoundOutcome {
    /// Block the request with status 401. One `WWW-Authenticate` value per
    /// entry, order-significant; the connection must be kept alive so the
    /// client can continue the handshake on the same transport.
    Challenge { schemes: Vec<String> },
    /// Admit the request carrying the authenticated principal. Some
    /// protocols hand the client one final `WWW-Authenticate` token for
    /// mutual authentication.
    Authenticated {
        principal: Arc<WindowsPrincipal>,
        mutual_token: Option<String>,
    },
}

/// Orchestrates provider selection, per-session handshake state, and
/// principal resolution. Immutable and freely shared across concurrent
/// requests; per-session slots carry their own locks.
pub struct NegotiationEngine {
    backend: Arc<dyn SecurityBackend>,
    registry: ProviderRegistry,
    principal_format: PrincipalFormat,
    role_format: PrincipalFormat,
    allow_guest_login: bool,
    impersonate: bool,
    sessions: SessionStore,
}

impl NegotiationEngine {
    /// Validate the configuration and instantiate every provider. Any
    /// configuration error aborts construction; the engine never serves
    /// requests half-configured.
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn SecurityBackend>,
    ) -> Result<Self, ConfigError> {
        let registry = ProviderRegistry::from_config(&config, &backend)?;
        Ok(Self {
            backend,
            registry,
            principal_format: config.principal_format,
            role_format: config.role_format,
            allow_guest_login: config.allow_guest_login,
            impersonate: config.impersonate,
            sessions: SessionStore::new(
                Duration::from_secs(config.handshake_timeout_secs),
                Duration::from_secs(config.session_idle_timeout_secs),
            ),
        })
    }

    /// Whether downstream handling should run under the resolved identity.
    #[must_use]
    pub fn impersonation_enabled(&self) -> bool {
        self.impersonate
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn SecurityBackend> {
        Arc::clone(&self.backend)
    }

    /// Principal held by an authenticated session, if any.
    #[must_use]
    pub fn authenticated_principal(&self, session: SessionKey) -> Option<Arc<WindowsPrincipal>> {
        let slot = self.sessions.get(session)?;
        let guard = slot.lock();
        match &guard.state {
            SlotState::Authenticated(principal) => Some(Arc::clone(principal)),
            _ => None,
        }
    }

    /// Drive one negotiation round for `session`.
    ///
    /// `authorization` is the raw `Authorization` header value, if present.
    /// Exactly one round executes synchronously; concurrent rounds on the
    /// same session serialize on the slot lock.
    pub fn process(&self, session: SessionKey, authorization: Option<&str>) -> RoundOutcome {
        self.sessions.evict_stale();

        let slot = self.sessions.slot(session);
        let mut slot = slot.lock();
        slot.touched = Instant::now();

        let Some(header) = authorization else {
            // No header. An authenticated session passes; an in-flight
            // handshake was abandoned and is disposed before re-challenging.
            if let SlotState::Authenticated(principal) = &slot.state {
                return RoundOutcome::Authenticated {
                    principal: Arc::clone(principal),
                    mutual_token: None,
                };
            }
            slot.state = SlotState::Idle;
            return self.challenge();
        };

        let Some((scheme, token)) = parse_authorization(header) else {
            tracing::debug!(session = %session, "unparseable authorization header");
            slot.state = SlotState::Idle;
            return self.challenge();
        };

        let Some(provider) = self.registry.select(&scheme) else {
            tracing::debug!(session = %session, scheme = %scheme, "no provider for scheme");
            if let SlotState::Authenticated(principal) = &slot.state {
                // Unrelated authorization (e.g. a Bearer token for another
                // layer) does not invalidate the session identity.
                return RoundOutcome::Authenticated {
                    principal: Arc::clone(principal),
                    mutual_token: None,
                };
            }
            slot.state = SlotState::Idle;
            return self.challenge();
        };

        let Ok(token) = BASE64.decode(&token) else {
            tracing::debug!(session = %session, scheme = %scheme, "authorization token is not valid base64");
            slot.state = SlotState::Idle;
            return self.challenge();
        };

        // Session-scoped reuse: authenticated sessions skip renegotiation
        // unless the client explicitly opens a new SSPI handshake.
        if matches!(slot.state, SlotState::Authenticated(_)) {
            if provider.forces_renegotiation(&token) {
                slot.state = SlotState::Idle;
            } else if let SlotState::Authenticated(principal) = &slot.state {
                return RoundOutcome::Authenticated {
                    principal: Arc::clone(principal),
                    mutual_token: None,
                };
            }
        }

        let outcome = match provider {
            SecurityProvider::Basic(basic) => {
                // Basic is stateless; a scheme switch abandons any pending
                // handshake.
                slot.state = SlotState::Idle;
                basic.authenticate(&token)
            }
            SecurityProvider::Negotiate(negotiate) => {
                let mut handshake = match std::mem::replace(&mut slot.state, SlotState::Idle) {
                    SlotState::Negotiating(handshake) => Some(handshake),
                    _ => None,
                };
                let outcome = negotiate.round(&mut handshake, &scheme, &token);
                if let Some(handshake) = handshake {
                    slot.state = SlotState::Negotiating(handshake);
                }
                outcome
            }
        };

        match outcome {
            ProviderOutcome::Continue { token } => RoundOutcome::Challenge {
                schemes: vec![format!("{scheme} {}", BASE64.encode(token))],
            },
            ProviderOutcome::Complete {
                identity,
                mutual_token,
            } => self.complete(&mut slot.state, &scheme, identity, mutual_token),
            ProviderOutcome::Reject { reason } => {
                tracing::debug!(session = %session, scheme = %scheme, reason = %reason, "negotiation rejected");
                slot.state = SlotState::Idle;
                self.challenge()
            }
        }
    }

    fn complete(
        &self,
        state: &mut SlotState,
        scheme: &str,
        identity: WindowsIdentity,
        mutual_token: Option<Vec<u8>>,
    ) -> RoundOutcome {
        if identity.is_guest() && !self.allow_guest_login {
            tracing::debug!(user = identity.fqn(), "guest logon refused");
            *state = SlotState::Idle;
            return self.challenge();
        }

        tracing::debug!(user = identity.fqn(), scheme, "authentication complete");
        let principal = Arc::new(WindowsPrincipal::resolve(
            identity,
            scheme,
            self.principal_format,
            self.role_format,
        ));
        *state = SlotState::Authenticated(Arc::clone(&principal));
        RoundOutcome::Authenticated {
            principal,
            mutual_token: mutual_token.map(|token| format!("{scheme} {}", BASE64.encode(token))),
        }
    }

    fn challenge(&self) -> RoundOutcome {
        RoundOutcome::Challenge {
            schemes: self.registry.initial_challenges(),
        }
    }
}

/// Split an `Authorization` value into its scheme token and (possibly
/// empty) base64 payload.
fn parse_authorization(header: &str) -> Option<(String, String)> {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.split_once(' ') {
        Some((scheme, payload)) => Some((scheme.to_owned(), payload.trim().to_owned())),
        None => Some((trimmed.to_owned(), String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sspi_gateway_sdk::SecurityIdentifier;
    use sspi_gateway_sdk::WindowsAccount;
    use sspi_gateway_sdk::mock::MockSecurityBackend;

    const NTLM_TYPE_1: &[u8] = &[
        0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00,
        0x00,
    ];
    const NTLM_TYPE_3: &[u8] = &[
        0x4e, 0x54, 0x4c, 0x4d, 0x53, 0x53, 0x50, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x00, 0x01, 0x23, 0x45, 0x67,
    ];

    fn engine_with(
        backend: &Arc<MockSecurityBackend>,
        config: GatewayConfig,
    ) -> NegotiationEngine {
        NegotiationEngine::new(config, Arc::clone(backend) as Arc<dyn SecurityBackend>).unwrap()
    }

    fn engine(backend: &Arc<MockSecurityBackend>) -> NegotiationEngine {
        engine_with(backend, GatewayConfig::default())
    }

    fn authz(scheme: &str, token: &[u8]) -> String {
        format!("{scheme} {}", BASE64.encode(token))
    }

    fn challenge_schemes(outcome: RoundOutcome) -> Vec<String> {
        match outcome {
            RoundOutcome::Challenge { schemes } => schemes,
            RoundOutcome::Authenticated { .. } => panic!("expected a challenge"),
        }
    }

    #[test]
    fn absent_header_yields_one_challenge_per_offered_scheme() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);

        let schemes = challenge_schemes(engine.process(SessionKey::new(), None));
        assert_eq!(
            schemes,
            vec![
                "Negotiate".to_owned(),
                "NTLM".to_owned(),
                "Basic realm=\"SspiGateway\"".to_owned(),
            ]
        );
    }

    #[test]
    fn multi_round_negotiate_completes_and_session_reuses_identity() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.set_challenge_rounds(2);
        let engine = engine(&backend);
        let session = SessionKey::new();

        let schemes =
            challenge_schemes(engine.process(session, Some(&authz("Negotiate", b"spnego-1"))));
        assert_eq!(schemes.len(), 1);
        assert!(schemes[0].starts_with("Negotiate "));

        let schemes =
            challenge_schemes(engine.process(session, Some(&authz("Negotiate", b"spnego-2"))));
        assert!(schemes[0].starts_with("Negotiate "));

        let outcome = engine.process(session, Some(&authz("Negotiate", b"spnego-3")));
        match outcome {
            RoundOutcome::Authenticated { principal, .. } => {
                assert_eq!(principal.name(), "MOCK\\user");
                assert_eq!(principal.auth_scheme(), "NEGOTIATE");
            }
            RoundOutcome::Challenge { .. } => panic!("expected authentication"),
        }

        // fast path: no header needed on subsequent requests
        assert!(matches!(
            engine.process(session, None),
            RoundOutcome::Authenticated { .. }
        ));
        assert!(engine.authenticated_principal(session).is_some());

        // one handshake, fully released
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_credentials(), 0);
        assert_eq!(backend.credentials_acquired(), 1);
    }

    #[test]
    fn basic_auth_completes_in_one_round() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);

        let outcome = engine.process(
            SessionKey::new(),
            Some(&authz("Basic", b"MOCK\\user:password")),
        );
        match outcome {
            RoundOutcome::Authenticated { principal, .. } => {
                assert_eq!(principal.auth_scheme(), "BASIC");
                assert_eq!(principal.principals(), &["MOCK\\user".to_owned()]);
            }
            RoundOutcome::Challenge { .. } => panic!("expected authentication"),
        }
    }

    #[test]
    fn basic_auth_with_bad_password_rechallenges() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);

        let schemes = challenge_schemes(engine.process(
            SessionKey::new(),
            Some(&authz("Basic", b"MOCK\\user:wrong")),
        ));
        assert_eq!(schemes.len(), 3);
    }

    #[test]
    fn guest_logon_is_refused_when_disallowed() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.add_account(
            "MOCK\\guest",
            "guest",
            WindowsIdentity::builder("MOCK\\Guest")
                .sid(SecurityIdentifier::from_string("S-1-5-21-100-200-300-501"))
                .guest(true)
                .build(),
        );
        let config = GatewayConfig::from_params([("allowGuestLogin", "false")]).unwrap();
        let engine = engine_with(&backend, config);
        let session = SessionKey::new();

        let outcome = engine.process(session, Some(&authz("Basic", b"MOCK\\guest:guest")));
        assert!(matches!(outcome, RoundOutcome::Challenge { .. }));
        assert!(engine.authenticated_principal(session).is_none());
    }

    #[test]
    fn guest_logon_is_accepted_by_default() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.add_account(
            "MOCK\\guest",
            "guest",
            WindowsIdentity::builder("MOCK\\Guest").guest(true).build(),
        );
        let engine = engine(&backend);

        let outcome = engine.process(
            SessionKey::new(),
            Some(&authz("Basic", b"MOCK\\guest:guest")),
        );
        assert!(matches!(outcome, RoundOutcome::Authenticated { .. }));
    }

    #[test]
    fn out_of_sequence_ntlm_disposes_context_and_restarts_cleanly() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);
        let session = SessionKey::new();

        let schemes = challenge_schemes(engine.process(session, Some(&authz("NTLM", NTLM_TYPE_1))));
        assert!(schemes[0].starts_with("NTLM "));
        assert_eq!(backend.live_contexts(), 1);

        // type 1 again while a type 3 is expected
        let schemes = challenge_schemes(engine.process(session, Some(&authz("NTLM", NTLM_TYPE_1))));
        assert_eq!(schemes.len(), 3, "reject falls back to initial challenges");
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_credentials(), 0);

        // a fresh handshake succeeds afterwards
        let schemes = challenge_schemes(engine.process(session, Some(&authz("NTLM", NTLM_TYPE_1))));
        assert!(schemes[0].starts_with("NTLM "));
        let outcome = engine.process(session, Some(&authz("NTLM", NTLM_TYPE_3)));
        assert!(matches!(outcome, RoundOutcome::Authenticated { .. }));
    }

    #[test]
    fn scheme_switch_to_basic_disposes_pending_handshake() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.set_challenge_rounds(2);
        let engine = engine(&backend);
        let session = SessionKey::new();

        let _ = engine.process(session, Some(&authz("Negotiate", b"spnego-1")));
        assert_eq!(backend.live_contexts(), 1);

        let outcome = engine.process(session, Some(&authz("Basic", b"MOCK\\user:password")));
        assert!(matches!(outcome, RoundOutcome::Authenticated { .. }));
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_credentials(), 0);
    }

    #[test]
    fn abandoned_handshake_is_evicted_after_timeout() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.set_challenge_rounds(5);
        let config = GatewayConfig::from_params([("handshakeTimeoutSeconds", "0")]).unwrap();
        let engine = engine_with(&backend, config);
        let session = SessionKey::new();

        let _ = engine.process(session, Some(&authz("Negotiate", b"spnego-1")));
        assert_eq!(backend.live_contexts(), 1);

        // any later round triggers eviction of the stale handshake
        let _ = engine.process(SessionKey::new(), None);
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_credentials(), 0);
    }

    #[test]
    fn authenticated_session_renegotiates_on_fresh_ntlm_opener() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);
        let session = SessionKey::new();

        let _ = engine.process(session, Some(&authz("NTLM", NTLM_TYPE_1)));
        let outcome = engine.process(session, Some(&authz("NTLM", NTLM_TYPE_3)));
        assert!(matches!(outcome, RoundOutcome::Authenticated { .. }));

        // a new type 1 forces a fresh handshake instead of the fast path
        let schemes = challenge_schemes(engine.process(session, Some(&authz("NTLM", NTLM_TYPE_1))));
        assert_eq!(schemes.len(), 1);
        assert!(schemes[0].starts_with("NTLM "));
    }

    #[test]
    fn mutual_token_is_surfaced_on_completion() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.set_challenge_rounds(0);
        backend.set_mutual_token(b"final-server-token".to_vec());
        let engine = engine(&backend);

        let outcome = engine.process(
            SessionKey::new(),
            Some(&authz("Negotiate", b"spnego-only-round")),
        );
        match outcome {
            RoundOutcome::Authenticated { mutual_token, .. } => {
                let value = mutual_token.expect("mutual token expected");
                assert!(value.starts_with("Negotiate "));
            }
            RoundOutcome::Challenge { .. } => panic!("expected authentication"),
        }
    }

    #[test]
    fn unknown_scheme_rechallenges() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);

        let schemes = challenge_schemes(
            engine.process(SessionKey::new(), Some("Bearer abc.def.ghi")),
        );
        assert_eq!(schemes.len(), 3);
    }

    #[test]
    fn invalid_base64_rechallenges() {
        let backend = Arc::new(MockSecurityBackend::new());
        let engine = engine(&backend);

        let schemes = challenge_schemes(
            engine.process(SessionKey::new(), Some("Negotiate not-base64!!!")),
        );
        assert_eq!(schemes.len(), 3);
    }

    #[test]
    fn config_errors_prevent_engine_construction() {
        let backend: Arc<dyn SecurityBackend> = Arc::new(MockSecurityBackend::new());

        let err = GatewayConfig::from_params([("securityFilterProviders", "negotiate kerberos5")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(name) if name == "kerberos5"));

        // empty protocol list passes parsing of the typed surface but fails
        // provider construction
        let mut config = GatewayConfig::default();
        config.negotiate.protocols.clear();
        assert!(NegotiationEngine::new(config, backend).is_err());
    }

    #[test]
    fn role_format_both_supports_name_and_sid_role_checks() {
        let backend = Arc::new(MockSecurityBackend::new());
        backend.set_challenge_rounds(0);
        backend.set_handshake_identity(
            WindowsIdentity::builder("CORP\\alice")
                .sid(SecurityIdentifier::from_string("S-1-5-21-1-2-3-1001"))
                .group(WindowsAccount::new(None, "Everyone", "S-1-1-0"))
                .build(),
        );
        let config = GatewayConfig::from_params([("roleFormat", "both")]).unwrap();
        let engine = engine_with(&backend, config);

        let outcome = engine.process(
            SessionKey::new(),
            Some(&authz("Negotiate", b"spnego-final")),
        );
        match outcome {
            RoundOutcome::Authenticated { principal, .. } => {
                assert!(principal.is_in_role("Everyone"));
                assert!(principal.is_in_role("S-1-1-0"));
            }
            RoundOutcome::Challenge { .. } => panic!("expected authentication"),
        }
    }
}
