//! Negotiate/NTLM provider.
//!
//! Stateful: each session's in-flight handshake advances one round per
//! request through a [`SecurityContext`]. The provider recognizes NTLM
//! messages embedded under a `Negotiate` banner (some clients only speak
//! NTLM behind the generic scheme) and validates the type 1 → type 3
//! message sequence before touching the backend.

use std::sync::Arc;

use sspi_gateway_sdk::SecurityBackend;

use crate::config::{ConfigError, Protocol};
use crate::domain::context::SecurityContext;
use crate::domain::ntlm::{self, NtlmMessageType};
use crate::domain::providers::ProviderOutcome;
use crate::domain::session::Handshake;

pub const SCHEME_NEGOTIATE: &str = "Negotiate";
pub const SCHEME_NTLM: &str = "NTLM";

pub struct NegotiateProvider {
    backend: Arc<dyn SecurityBackend>,
    protocols: Vec<Protocol>,
}

// `SecurityBackend` is not `Debug`, so the trait-object field rules out a
// derive; format the configured protocols and omit the backend handle.
impl std::fmt::Debug for NegotiateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiateProvider")
            .field("protocols", &self.protocols)
            .finish_non_exhaustive()
    }
}

impl NegotiateProvider {
    /// Fails fast when the configured protocol list is empty; unrecognized
    /// protocol names were already refused during config parsing.
    pub fn new(
        backend: Arc<dyn SecurityBackend>,
        protocols: &[Protocol],
    ) -> Result<Self, ConfigError> {
        if protocols.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "negotiate/protocols".to_owned(),
                value: String::new(),
            });
        }
        Ok(Self {
            backend,
            protocols: protocols.to_vec(),
        })
    }

    #[must_use]
    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.protocols
            .iter()
            .any(|protocol| protocol.scheme().eq_ignore_ascii_case(scheme))
    }

    /// One bare scheme value per enabled protocol, in configured order.
    #[must_use]
    pub fn initial_challenges(&self) -> Vec<String> {
        self.protocols
            .iter()
            .map(|protocol| protocol.scheme().to_owned())
            .collect()
    }

    /// Drive one handshake round.
    ///
    /// `handshake` is the session's in-flight negotiation state; the
    /// provider replaces it on Continue and clears it on Complete and on
    /// every reject path, so a stale security context never outlives the
    /// round that invalidated it.
    #[must_use]
    pub fn round(
        &self,
        handshake: &mut Option<Handshake>,
        scheme: &str,
        token: &[u8],
    ) -> ProviderOutcome {
        if token.is_empty() {
            return self.first_round(handshake, scheme);
        }

        let ntlm_shaped = ntlm::is_ntlm_message(token);
        let package = if ntlm_shaped {
            // payload wins over the banner scheme
            Protocol::Ntlm
        } else if scheme.eq_ignore_ascii_case(SCHEME_NTLM) {
            *handshake = None;
            return ProviderOutcome::Reject {
                reason: "NTLM scheme without an NTLM message".to_owned(),
            };
        } else {
            Protocol::Negotiate
        };

        if !self.protocols.contains(&package) {
            *handshake = None;
            return ProviderOutcome::Reject {
                reason: format!("protocol {} is not enabled", package.scheme()),
            };
        }

        // A handshake started under the other package is stale.
        if handshake
            .as_ref()
            .is_some_and(|hs| !hs.context.package().eq_ignore_ascii_case(package.scheme()))
        {
            *handshake = None;
        }

        if ntlm_shaped {
            if let Some(reject) = validate_ntlm_sequence(handshake, token) {
                return reject;
            }
        }

        let mut hs = match handshake.take() {
            Some(hs) => hs,
            None => match SecurityContext::new(Arc::clone(&self.backend), package.scheme()) {
                Ok(context) => Handshake::new(scheme, context),
                Err(err) => {
                    tracing::warn!(package = package.scheme(), error = %err, "credentials acquisition failed");
                    return ProviderOutcome::Reject {
                        reason: "unable to establish a security context".to_owned(),
                    };
                }
            },
        };

        match hs.context.step(Some(token)) {
            Err(err) => {
                // hs drops here, disposing the context
                tracing::debug!(scheme, error = %err, "negotiation step rejected");
                ProviderOutcome::Reject {
                    reason: "security token rejected".to_owned(),
                }
            }
            Ok(false) => {
                hs.awaiting_ntlm_authenticate = ntlm_shaped;
                let token = hs.context.token().to_vec();
                *handshake = Some(hs);
                ProviderOutcome::Continue { token }
            }
            Ok(true) => match hs.context.identity() {
                Ok(identity) => {
                    let mutual_token =
                        (!hs.context.token().is_empty()).then(|| hs.context.token().to_vec());
                    ProviderOutcome::Complete {
                        identity,
                        mutual_token,
                    }
                }
                Err(err) => {
                    tracing::warn!(scheme, error = %err, "identity resolution failed");
                    ProviderOutcome::Reject {
                        reason: "unable to resolve the authenticated identity".to_owned(),
                    }
                }
            },
        }
    }

    /// Bare scheme header: the server speaks first.
    fn first_round(&self, handshake: &mut Option<Handshake>, scheme: &str) -> ProviderOutcome {
        *handshake = None;
        let package = if scheme.eq_ignore_ascii_case(SCHEME_NTLM) {
            Protocol::Ntlm
        } else {
            Protocol::Negotiate
        };
        if !self.protocols.contains(&package) {
            return ProviderOutcome::Reject {
                reason: format!("protocol {} is not enabled", package.scheme()),
            };
        }
        let mut context = match SecurityContext::new(Arc::clone(&self.backend), package.scheme()) {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(package = package.scheme(), error = %err, "credentials acquisition failed");
                return ProviderOutcome::Reject {
                    reason: "unable to establish a security context".to_owned(),
                };
            }
        };
        match context.step(None) {
            Err(err) => {
                tracing::debug!(scheme, error = %err, "initial challenge failed");
                ProviderOutcome::Reject {
                    reason: "unable to produce an initial challenge".to_owned(),
                }
            }
            Ok(_) => {
                let token = context.token().to_vec();
                *handshake = Some(Handshake::new(scheme, context));
                ProviderOutcome::Continue { token }
            }
        }
    }
}

/// NTLM sequencing: a fresh handshake must open with a type 1; once the
/// type 2 challenge went out, only a type 3 is acceptable.
fn validate_ntlm_sequence(
    handshake: &mut Option<Handshake>,
    token: &[u8],
) -> Option<ProviderOutcome> {
    let Some(message_type) = ntlm::message_type(token) else {
        *handshake = None;
        return Some(ProviderOutcome::Reject {
            reason: "unrecognized NTLM message type".to_owned(),
        });
    };
    let expected = match handshake.as_ref() {
        Some(hs) if hs.awaiting_ntlm_authenticate => NtlmMessageType::Authenticate,
        _ => NtlmMessageType::Negotiate,
    };
    if message_type == expected {
        None
    } else {
        *handshake = None;
        Some(ProviderOutcome::Reject {
            reason: format!("out-of-sequence NTLM message ({message_type:?})"),
        })
    }
}
