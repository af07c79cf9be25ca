//! SSPI Negotiate/NTLM/Basic authentication gateway.
//!
//! An HTTP-request authentication gate that negotiates identity with the
//! client over `Authorization` / `WWW-Authenticate` headers, resolves the
//! authenticated identity into a principal with group memberships, and
//! exposes it to downstream request handling.
//!
//! The cryptography lives behind the [`sspi_gateway_sdk::SecurityBackend`]
//! trait; this crate drives the multi-round handshake over stateless HTTP
//! request/response pairs, owns the per-session security-context lifecycle,
//! and formats principals and roles.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use sspi_gateway::{auth, GatewayConfig, NegotiationEngine};
//!
//! let backend: Arc<dyn sspi_gateway_sdk::SecurityBackend> = /* platform backend */;
//! let engine = Arc::new(NegotiationEngine::new(GatewayConfig::default(), backend)?);
//!
//! let router = router.layer(axum::middleware::from_fn_with_state(
//!     auth::AuthState::new(engine),
//!     auth::negotiate_middleware,
//! ));
//! ```
//!
//! Handlers read the identity from the request extensions:
//!
//! ```ignore
//! async fn whoami(Extension(user): Extension<auth::AuthenticatedPrincipal>) -> String {
//!     format!("{} ({})", user.name(), user.auth_scheme())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod domain;

pub use config::{ConfigError, GatewayConfig, ProviderKind, Protocol};
pub use domain::engine::{NegotiationEngine, RoundOutcome};
pub use domain::principal::{PrincipalFormat, WindowsPrincipal};
pub use domain::session::SessionKey;
