//! Principal and role formatting.

use serde::{Deserialize, Serialize};
use sspi_gateway_sdk::{WindowsAccount, WindowsIdentity};

/// How an identity (or group) is rendered into caller-visible strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalFormat {
    /// Fully-qualified name, `DOMAIN\account`.
    Fqn,
    /// SID string, `S-1-…`.
    Sid,
    /// Name followed by SID.
    Both,
    /// No contribution.
    None,
}

impl PrincipalFormat {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fqn" => Some(Self::Fqn),
            "sid" => Some(Self::Sid),
            "both" => Some(Self::Both),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

fn expand(into: &mut Vec<String>, fqn: &str, sid: &str, format: PrincipalFormat) {
    match format {
        PrincipalFormat::Fqn => into.push(fqn.to_owned()),
        PrincipalFormat::Sid => into.push(sid.to_owned()),
        PrincipalFormat::Both => {
            into.push(fqn.to_owned());
            into.push(sid.to_owned());
        }
        PrincipalFormat::None => {}
    }
}

/// The downstream-visible authenticated principal.
///
/// Built once per completed handshake and attached to the session; request
/// handlers read it from the request extensions.
#[derive(Debug, Clone)]
pub struct WindowsPrincipal {
    identity: WindowsIdentity,
    auth_scheme: String,
    principals: Vec<String>,
    roles: Vec<String>,
}

impl WindowsPrincipal {
    /// Render `identity` under the configured formats.
    ///
    /// The role list starts with the user principal strings and appends one
    /// expansion per group, in backend-reported order, without deduplication.
    #[must_use]
    pub fn resolve(
        identity: WindowsIdentity,
        auth_scheme: &str,
        principal_format: PrincipalFormat,
        role_format: PrincipalFormat,
    ) -> Self {
        let mut principals = Vec::new();
        expand(
            &mut principals,
            identity.fqn(),
            identity.sid().as_str(),
            principal_format,
        );

        let mut roles = principals.clone();
        for group in identity.groups() {
            expand(&mut roles, &group.fqn(), group.sid_string(), role_format);
        }

        Self {
            identity,
            auth_scheme: auth_scheme.to_ascii_uppercase(),
            principals,
            roles,
        }
    }

    /// Fully-qualified name of the authenticated user.
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.fqn()
    }

    /// SID string of the authenticated user.
    #[must_use]
    pub fn sid_string(&self) -> &str {
        self.identity.sid().as_str()
    }

    /// Scheme label of the handshake that produced this principal
    /// (`NEGOTIATE`, `NTLM`, `BASIC`).
    #[must_use]
    pub fn auth_scheme(&self) -> &str {
        &self.auth_scheme
    }

    /// User principal strings under the configured principal format.
    #[must_use]
    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    /// Role strings: user principals plus formatted group memberships.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Structured group memberships.
    #[must_use]
    pub fn groups(&self) -> &[WindowsAccount] {
        self.identity.groups()
    }

    #[must_use]
    pub fn identity(&self) -> &WindowsIdentity {
        &self.identity
    }

    /// Role-membership test against the formatted role list, falling back to
    /// the plain (domain-free) group names carried on each group.
    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
            || self.identity.groups().iter().any(|g| g.name() == role)
    }
}
