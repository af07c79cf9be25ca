//! Configuration for the SSPI gateway.
//!
//! Two surfaces feed the same [`GatewayConfig`]: a typed struct deserialized
//! from the host's configuration file, and [`GatewayConfig::from_params`]
//! for containers that hand the filter an ordered list of string
//! init-parameters (per-provider options keyed `<provider>/<option>`).
//! Both validate exhaustively — an unknown provider, protocol, or parameter
//! stops initialization before the engine exists.

use serde::{Deserialize, Serialize};

use crate::domain::principal::PrincipalFormat;

/// Startup configuration errors. Fatal: the engine is never constructed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown security filter provider: {0}")]
    UnknownProvider(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("invalid parameter: {0}")]
    UnknownParameter(String),

    #[error("invalid value '{value}' for parameter {key}")]
    InvalidValue { key: String, value: String },
}

/// Recognized provider identifiers, in the static registry that replaces
/// class-name reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Negotiate,
    Basic,
}

impl ProviderKind {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "negotiate" => Some(Self::Negotiate),
            "basic" => Some(Self::Basic),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negotiate => "negotiate",
            Self::Basic => "basic",
        }
    }
}

/// Sub-protocols the Negotiate provider may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Negotiate,
    Ntlm,
}

impl Protocol {
    /// Parses the `Authorization`-scheme spelling used by the legacy
    /// init-parameter surface.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Negotiate" => Some(Self::Negotiate),
            "NTLM" => Some(Self::Ntlm),
            _ => None,
        }
    }

    /// The `Authorization`/`WWW-Authenticate` scheme literal.
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Negotiate => "Negotiate",
            Self::Ntlm => "NTLM",
        }
    }
}

/// Options for the Negotiate provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NegotiateOptions {
    /// Ordered allow-list of sub-protocols advertised and accepted.
    pub protocols: Vec<Protocol>,
}

impl Default for NegotiateOptions {
    fn default() -> Self {
        Self {
            protocols: vec![Protocol::Negotiate, Protocol::Ntlm],
        }
    }
}

/// Options for the Basic provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BasicOptions {
    /// Realm string advertised in the `Basic` challenge.
    pub realm: String,
}

impl Default for BasicOptions {
    fn default() -> Self {
        Self {
            realm: default_realm(),
        }
    }
}

fn default_realm() -> String {
    "SspiGateway".to_owned()
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

fn default_session_idle_timeout_secs() -> u64 {
    300
}

/// Gateway configuration. Immutable after engine construction and shared
/// read-only across concurrent requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
#[allow(clippy::struct_excessive_bools)]
pub struct GatewayConfig {
    /// Ordered list of offered providers; order controls challenge order.
    pub providers: Vec<ProviderKind>,

    /// How the authenticated user is rendered into principal strings.
    pub principal_format: PrincipalFormat,

    /// How group memberships are rendered into role strings.
    pub role_format: PrincipalFormat,

    /// Whether a logon that resolves to the guest account is accepted.
    pub allow_guest_login: bool,

    /// Whether downstream handling runs under the resolved identity.
    pub impersonate: bool,

    pub negotiate: NegotiateOptions,

    pub basic: BasicOptions,

    /// How long an incomplete handshake may sit idle before its security
    /// context is disposed.
    pub handshake_timeout_secs: u64,

    /// How long an authenticated session may sit idle before it is dropped
    /// from the session store.
    pub session_idle_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderKind::Negotiate, ProviderKind::Basic],
            principal_format: PrincipalFormat::Fqn,
            role_format: PrincipalFormat::Fqn,
            allow_guest_login: true,
            impersonate: false,
            negotiate: NegotiateOptions::default(),
            basic: BasicOptions::default(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Build a configuration from container-style init parameters.
    ///
    /// Recognized keys: `principalFormat`, `roleFormat`, `allowGuestLogin`,
    /// `impersonate`, `securityFilterProviders` (whitespace-separated),
    /// `handshakeTimeoutSeconds`, `sessionIdleTimeoutSeconds`,
    /// `negotiate/protocols`, `basic/realm`. Anything else fails with a
    /// [`ConfigError`] naming the offending key.
    pub fn from_params<'a, I>(params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            match key.split_once('/') {
                Some((provider, option)) => config.apply_provider_param(provider, option, value)?,
                None => config.apply_param(key, value)?,
            }
        }
        if config.providers.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "securityFilterProviders".to_owned(),
                value: String::new(),
            });
        }
        Ok(config)
    }

    fn apply_param(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "principalFormat" => {
                self.principal_format = parse_format(key, value)?;
            }
            "roleFormat" => {
                self.role_format = parse_format(key, value)?;
            }
            "allowGuestLogin" => {
                self.allow_guest_login = parse_bool(key, value)?;
            }
            "impersonate" => {
                self.impersonate = parse_bool(key, value)?;
            }
            "securityFilterProviders" => {
                let mut providers = Vec::new();
                for name in value.split_whitespace() {
                    let kind = ProviderKind::parse(name)
                        .ok_or_else(|| ConfigError::UnknownProvider(name.to_owned()))?;
                    providers.push(kind);
                }
                self.providers = providers;
            }
            "handshakeTimeoutSeconds" => {
                self.handshake_timeout_secs = parse_u64(key, value)?;
            }
            "sessionIdleTimeoutSeconds" => {
                self.session_idle_timeout_secs = parse_u64(key, value)?;
            }
            _ => return Err(ConfigError::UnknownParameter(key.to_owned())),
        }
        Ok(())
    }

    fn apply_provider_param(
        &mut self,
        provider: &str,
        option: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let kind = ProviderKind::parse(provider)
            .ok_or_else(|| ConfigError::UnknownProvider(provider.to_owned()))?;
        match (kind, option) {
            (ProviderKind::Negotiate, "protocols") => {
                let mut protocols = Vec::new();
                for name in value.split_whitespace() {
                    let protocol = Protocol::parse(name)
                        .ok_or_else(|| ConfigError::UnsupportedProtocol(name.to_owned()))?;
                    if !protocols.contains(&protocol) {
                        protocols.push(protocol);
                    }
                }
                if protocols.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "negotiate/protocols".to_owned(),
                        value: value.to_owned(),
                    });
                }
                self.negotiate.protocols = protocols;
            }
            (ProviderKind::Basic, "realm") => {
                self.basic.realm = value.to_owned();
            }
            _ => {
                return Err(ConfigError::UnknownParameter(format!(
                    "{provider}/{option}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_format(key: &str, value: &str) -> Result<PrincipalFormat, ConfigError> {
    PrincipalFormat::parse(value).ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}
