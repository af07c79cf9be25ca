//! Axum middleware driving the negotiation engine.
//!
//! For each request:
//! 1. Resolves the session key (request extension, then connect-info, then
//!    a fresh single-request session)
//! 2. Runs one engine round with the raw `Authorization` header
//! 3. On challenge: responds 401 with one `WWW-Authenticate` per offered
//!    scheme and `Connection: keep-alive` — handshakes are bound to the
//!    transport connection
//! 4. On completion: inserts the [`WindowsPrincipal`] into the request
//!    extensions and runs the inner service, optionally impersonating

use std::sync::Arc;

use axum::extract::connect_info::{ConnectInfo, Connected};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::domain::engine::{NegotiationEngine, RoundOutcome};
use crate::domain::principal::WindowsPrincipal;
use crate::domain::session::SessionKey;

/// Shared state for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub engine: Arc<NegotiationEngine>,
}

impl AuthState {
    #[must_use]
    pub fn new(engine: Arc<NegotiationEngine>) -> Self {
        Self { engine }
    }
}

/// One [`SessionKey`] per accepted connection, for
/// `Router::into_make_service_with_connect_info::<SessionKey>()`.
impl<T> Connected<T> for SessionKey {
    fn connect_info(_target: T) -> Self {
        SessionKey::new()
    }
}

/// Authentication middleware. Wire it up the usual way:
///
/// ```ignore
/// let router = router.layer(axum::middleware::from_fn_with_state(
///     AuthState::new(engine),
///     sspi_gateway::auth::negotiate_middleware,
/// ));
/// ```
pub async fn negotiate_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = session_key(&req);
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match state.engine.process(session, authorization.as_deref()) {
        RoundOutcome::Challenge { schemes } => challenge_response(&schemes),
        RoundOutcome::Authenticated {
            principal,
            mutual_token,
        } => {
            req.extensions_mut().insert(Arc::clone(&principal));

            let impersonation = if state.engine.impersonation_enabled() {
                match state.engine.backend().impersonate(principal.identity()) {
                    Ok(guard) => Some(guard),
                    Err(err) => {
                        tracing::error!(user = principal.name(), error = %err, "impersonation failed");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                }
            } else {
                None
            };

            let mut response = next.run(req).await;
            drop(impersonation);

            if let Some(token) = mutual_token {
                if let Ok(value) = HeaderValue::from_str(&token) {
                    response
                        .headers_mut()
                        .append(header::WWW_AUTHENTICATE, value);
                }
            }
            response
        }
    }
}

fn session_key(req: &Request) -> SessionKey {
    if let Some(key) = req.extensions().get::<SessionKey>() {
        return *key;
    }
    if let Some(ConnectInfo(key)) = req.extensions().get::<ConnectInfo<SessionKey>>() {
        return *key;
    }
    // No connection identity: a fresh key still lets single-round schemes
    // (Basic) complete; multi-round handshakes need a pinned session.
    SessionKey::new()
}

fn challenge_response(schemes: &[String]) -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    let headers = response.headers_mut();
    for scheme in schemes {
        if let Ok(value) = HeaderValue::from_str(scheme) {
            headers.append(header::WWW_AUTHENTICATE, value);
        }
    }
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Convenience re-export of the extension type handlers extract:
/// `Extension<Arc<WindowsPrincipal>>`.
pub type AuthenticatedPrincipal = Arc<WindowsPrincipal>;
