//! HTTP Basic provider.

use std::sync::Arc;

use sspi_gateway_sdk::SecurityBackend;

use crate::domain::providers::ProviderOutcome;

pub const SCHEME_BASIC: &str = "Basic";

/// Stateless per-request provider validating `user:password` pairs through
/// the backend's explicit-credentials logon.
pub struct BasicProvider {
    backend: Arc<dyn SecurityBackend>,
    realm: String,
}

impl BasicProvider {
    #[must_use]
    pub fn new(backend: Arc<dyn SecurityBackend>, realm: &str) -> Self {
        Self {
            backend,
            realm: realm.to_owned(),
        }
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// `WWW-Authenticate` value advertised on the initial challenge.
    #[must_use]
    pub fn initial_challenge(&self) -> String {
        format!("{SCHEME_BASIC} realm=\"{}\"", self.realm)
    }

    /// Validate one decoded `user:password` token.
    ///
    /// The reject reason never carries the submitted password; logon failure
    /// detail stays in the log.
    #[must_use]
    pub fn authenticate(&self, token: &[u8]) -> ProviderOutcome {
        let Ok(text) = std::str::from_utf8(token) else {
            return ProviderOutcome::Reject {
                reason: "basic credentials are not valid UTF-8".to_owned(),
            };
        };
        let Some((username, password)) = text.split_once(':') else {
            return ProviderOutcome::Reject {
                reason: "basic credentials missing ':' separator".to_owned(),
            };
        };

        match self.backend.logon_user(username, password) {
            Ok(identity) => ProviderOutcome::Complete {
                identity,
                mutual_token: None,
            },
            Err(err) => {
                tracing::debug!(user = username, error = %err, "basic logon rejected");
                ProviderOutcome::Reject {
                    reason: "invalid credentials".to_owned(),
                }
            }
        }
    }
}
