//! SSPI Gateway SDK
//!
//! This crate provides the boundary between the negotiation engine and the
//! OS identity provider:
//!
//! - [`SecurityBackend`] - the provider capability consumed by the gateway
//! - [`WindowsIdentity`] / [`WindowsAccount`] - resolved identity models
//! - [`BackendError`] - error types
//! - [`mock::MockSecurityBackend`] - scriptable in-memory backend for tests
//!
//! ## Usage
//!
//! The gateway is handed an `Arc<dyn SecurityBackend>` at construction:
//!
//! ```ignore
//! use sspi_gateway_sdk::SecurityBackend;
//!
//! let backend: Arc<dyn SecurityBackend> = Arc::new(WindowsSspiBackend::new());
//! let engine = NegotiationEngine::new(config, backend)?;
//! ```
//!
//! On Windows hosts the trait is implemented over the native SSPI calls
//! (`AcquireCredentialsHandle`, `AcceptSecurityContext`, `LogonUser`); the
//! [`mock`] module ships a deterministic implementation for test suites and
//! demos on any platform.

pub mod api;
pub mod error;
pub mod mock;
pub mod models;

// Re-export main types at crate root
pub use api::{
    AcceptOutcome, ImpersonationContext, RawCredentialsHandle, RawSecurityContext, SecurityBackend,
};
pub use error::BackendError;
pub use models::{SecurityIdentifier, WindowsAccount, WindowsIdentity};
