//! Security filter providers and their registry.
//!
//! The recognized provider set is fixed, so dispatch is a closed enum
//! matched exhaustively rather than open-ended registration.

pub mod basic;
pub mod negotiate;

use std::sync::Arc;

use sspi_gateway_sdk::{SecurityBackend, WindowsIdentity};

use crate::config::{ConfigError, GatewayConfig, ProviderKind};

pub use basic::BasicProvider;
pub use negotiate::NegotiateProvider;

/// Result of one provider round.
#[derive(Debug)]
pub enum ProviderOutcome {
    /// Handshake incomplete; relay `token` to the client as a challenge.
    Continue { token: Vec<u8> },
    /// Handshake finished. `mutual_token` is a final token some protocols
    /// hand the client alongside the passed-through response.
    Complete {
        identity: WindowsIdentity,
        mutual_token: Option<Vec<u8>>,
    },
    /// Negotiation failed; the engine re-challenges from scratch.
    Reject { reason: String },
}

/// A configured provider instance.
pub enum SecurityProvider {
    Negotiate(NegotiateProvider),
    Basic(BasicProvider),
}

impl SecurityProvider {
    /// Whether this provider handles the given `Authorization` scheme.
    #[must_use]
    pub fn supports_scheme(&self, scheme: &str) -> bool {
        match self {
            Self::Negotiate(provider) => provider.supports_scheme(scheme),
            Self::Basic(_) => scheme.eq_ignore_ascii_case(basic::SCHEME_BASIC),
        }
    }

    /// Challenge-initiation values advertised when no `Authorization` header
    /// is present.
    #[must_use]
    pub fn initial_challenges(&self) -> Vec<String> {
        match self {
            Self::Negotiate(provider) => provider.initial_challenges(),
            Self::Basic(provider) => vec![provider.initial_challenge()],
        }
    }

    /// Whether an already-authenticated session presenting this token is
    /// explicitly opening a new handshake (bare scheme or an NTLM type 1
    /// opener) rather than replaying credentials.
    #[must_use]
    pub fn forces_renegotiation(&self, token: &[u8]) -> bool {
        match self {
            Self::Negotiate(_) => {
                token.is_empty()
                    || crate::domain::ntlm::message_type(token)
                        == Some(crate::domain::ntlm::NtlmMessageType::Negotiate)
            }
            Self::Basic(_) => false,
        }
    }
}

/// Ordered collection of configured providers, selected by scheme.
pub struct ProviderRegistry {
    providers: Vec<SecurityProvider>,
}

impl ProviderRegistry {
    /// Instantiate every configured provider. Fails fast on invalid
    /// per-provider options; a half-configured registry is never observable.
    pub fn from_config(
        config: &GatewayConfig,
        backend: &Arc<dyn SecurityBackend>,
    ) -> Result<Self, ConfigError> {
        let mut providers = Vec::with_capacity(config.providers.len());
        for kind in &config.providers {
            let provider = match kind {
                ProviderKind::Negotiate => SecurityProvider::Negotiate(NegotiateProvider::new(
                    Arc::clone(backend),
                    &config.negotiate.protocols,
                )?),
                ProviderKind::Basic => SecurityProvider::Basic(BasicProvider::new(
                    Arc::clone(backend),
                    &config.basic.realm,
                )),
            };
            providers.push(provider);
        }
        Ok(Self { providers })
    }

    /// Provider responsible for the given `Authorization` scheme, if any.
    #[must_use]
    pub fn select(&self, scheme: &str) -> Option<&SecurityProvider> {
        self.providers
            .iter()
            .find(|provider| provider.supports_scheme(scheme))
    }

    /// One `WWW-Authenticate` value per offered scheme, in configured order.
    #[must_use]
    pub fn initial_challenges(&self) -> Vec<String> {
        self.providers
            .iter()
            .flat_map(SecurityProvider::initial_challenges)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sspi_gateway_sdk::mock::MockSecurityBackend;

    fn registry(config: &GatewayConfig) -> ProviderRegistry {
        let backend: Arc<dyn SecurityBackend> = Arc::new(MockSecurityBackend::new());
        ProviderRegistry::from_config(config, &backend).unwrap()
    }

    #[test]
    fn default_config_offers_negotiate_ntlm_then_basic() {
        let registry = registry(&GatewayConfig::default());
        assert_eq!(
            registry.initial_challenges(),
            vec![
                "Negotiate".to_owned(),
                "NTLM".to_owned(),
                "Basic realm=\"SspiGateway\"".to_owned(),
            ]
        );
    }

    #[test]
    fn selection_is_scheme_driven_and_case_insensitive() {
        let registry = registry(&GatewayConfig::default());
        assert!(matches!(
            registry.select("Negotiate"),
            Some(SecurityProvider::Negotiate(_))
        ));
        assert!(matches!(
            registry.select("NTLM"),
            Some(SecurityProvider::Negotiate(_))
        ));
        assert!(matches!(
            registry.select("basic"),
            Some(SecurityProvider::Basic(_))
        ));
        assert!(registry.select("Bearer").is_none());
    }

    #[test]
    fn disabled_protocol_is_not_selectable() {
        let config = GatewayConfig::from_params([("negotiate/protocols", "Negotiate")]).unwrap();
        let registry = registry(&config);
        assert!(registry.select("NTLM").is_none());
        assert_eq!(
            registry.initial_challenges(),
            vec![
                "Negotiate".to_owned(),
                "Basic realm=\"SspiGateway\"".to_owned()
            ]
        );
    }

    #[test]
    fn provider_order_follows_configuration() {
        let config =
            GatewayConfig::from_params([("securityFilterProviders", "basic negotiate")]).unwrap();
        let registry = registry(&config);
        let challenges = registry.initial_challenges();
        assert!(challenges[0].starts_with("Basic realm=\""));
        assert_eq!(challenges[1], "Negotiate");
    }
}
