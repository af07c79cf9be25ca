//! Identity models resolved by a security backend.

use serde::Serialize;

/// A Windows security identifier in raw and string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityIdentifier {
    bytes: Vec<u8>,
    string: String,
}

impl SecurityIdentifier {
    #[must_use]
    pub fn new(bytes: Vec<u8>, string: impl Into<String>) -> Self {
        Self {
            bytes,
            string: string.into(),
        }
    }

    /// Build an identifier whose raw form mirrors the string form.
    ///
    /// Real backends carry the binary SID structure; test fixtures only need
    /// a stable byte sequence.
    #[must_use]
    pub fn from_string(string: impl Into<String>) -> Self {
        let string = string.into();
        Self {
            bytes: string.clone().into_bytes(),
            string,
        }
    }

    /// Raw SID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// String form, e.g. `S-1-5-21-…`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl std::fmt::Display for SecurityIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}

/// A group account carried by a [`WindowsIdentity`].
///
/// The domain and account name are kept as a structured pair; consumers that
/// want a plain group label use [`WindowsAccount::name`] instead of splitting
/// the qualified name on the domain substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowsAccount {
    domain: Option<String>,
    name: String,
    sid: String,
}

impl WindowsAccount {
    #[must_use]
    pub fn new(domain: Option<String>, name: impl Into<String>, sid: impl Into<String>) -> Self {
        Self {
            domain,
            name: name.into(),
            sid: sid.into(),
        }
    }

    /// Account domain, if the account is domain-qualified.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Plain account name without the domain.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SID string of the account.
    #[must_use]
    pub fn sid_string(&self) -> &str {
        &self.sid
    }

    /// Fully-qualified `DOMAIN\name` form, or the plain name for local
    /// accounts.
    #[must_use]
    pub fn fqn(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{domain}\\{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// An authenticated identity with its group memberships.
///
/// Immutable once resolved by the backend; group order is the order the
/// backend reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowsIdentity {
    fqn: String,
    sid: SecurityIdentifier,
    groups: Vec<WindowsAccount>,
    guest: bool,
}

impl WindowsIdentity {
    #[must_use]
    pub fn builder(fqn: impl Into<String>) -> WindowsIdentityBuilder {
        WindowsIdentityBuilder {
            fqn: fqn.into(),
            sid: None,
            groups: Vec::new(),
            guest: false,
        }
    }

    /// Fully-qualified user name, e.g. `DOMAIN\user`.
    #[must_use]
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    #[must_use]
    pub fn sid(&self) -> &SecurityIdentifier {
        &self.sid
    }

    /// Group memberships in backend-reported order.
    #[must_use]
    pub fn groups(&self) -> &[WindowsAccount] {
        &self.groups
    }

    /// Whether the account resolved to the guest account.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.guest
    }
}

pub struct WindowsIdentityBuilder {
    fqn: String,
    sid: Option<SecurityIdentifier>,
    groups: Vec<WindowsAccount>,
    guest: bool,
}

impl WindowsIdentityBuilder {
    #[must_use]
    pub fn sid(mut self, sid: SecurityIdentifier) -> Self {
        self.sid = Some(sid);
        self
    }

    #[must_use]
    pub fn group(mut self, group: WindowsAccount) -> Self {
        self.groups.push(group);
        self
    }

    #[must_use]
    pub fn guest(mut self, guest: bool) -> Self {
        self.guest = guest;
        self
    }

    #[must_use]
    pub fn build(self) -> WindowsIdentity {
        let sid = self
            .sid
            .unwrap_or_else(|| SecurityIdentifier::from_string("S-1-0-0"));
        WindowsIdentity {
            fqn: self.fqn,
            sid,
            groups: self.groups,
            guest: self.guest,
        }
    }
}
