//! Negotiation engine internals: security-context lifecycle, providers,
//! session state, and principal resolution.

pub mod context;
pub mod engine;
pub mod error;
pub mod ntlm;
pub mod principal;
pub mod providers;
pub mod session;

pub use engine::{NegotiationEngine, RoundOutcome};
pub use error::AuthError;
pub use principal::{PrincipalFormat, WindowsPrincipal};
pub use session::SessionKey;
