//! Session-bound negotiation state.
//!
//! The engine owns an explicit map from session key to negotiation slot; a
//! per-slot mutex serializes concurrent rounds on the same session, and
//! stale slots are evicted opportunistically on engine entry — abandoned
//! handshakes must not hold native security contexts forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::context::SecurityContext;
use crate::domain::principal::WindowsPrincipal;

/// Identifies one client session (one transport connection in the axum
/// adapter — SSPI handshakes are bound to a connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(Uuid);

impl SessionKey {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One in-flight handshake held by a session.
pub struct Handshake {
    /// `Authorization` scheme the client is negotiating under.
    pub scheme: String,
    pub context: SecurityContext,
    /// Set once an NTLM type 1 was accepted; the next NTLM message must be
    /// a type 3.
    pub awaiting_ntlm_authenticate: bool,
}

impl Handshake {
    #[must_use]
    pub fn new(scheme: &str, context: SecurityContext) -> Self {
        Self {
            scheme: scheme.to_owned(),
            context,
            awaiting_ntlm_authenticate: false,
        }
    }
}

/// Authentication state of one session.
pub(crate) enum SlotState {
    /// No identity, no handshake (covers both "never challenged" and
    /// "challenged, waiting for the client's first token").
    Idle,
    /// A handshake is in flight.
    Negotiating(Handshake),
    /// Identity established; subsequent requests pass without renegotiation.
    Authenticated(Arc<WindowsPrincipal>),
}

pub(crate) struct SessionSlot {
    pub state: SlotState,
    pub touched: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: SlotState::Idle,
            touched: Instant::now(),
        }
    }
}

/// Map of per-session negotiation slots.
pub(crate) struct SessionStore {
    slots: DashMap<SessionKey, Arc<Mutex<SessionSlot>>>,
    handshake_timeout: Duration,
    session_idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(handshake_timeout: Duration, session_idle_timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            handshake_timeout,
            session_idle_timeout,
        }
    }

    /// Slot for `key`, created on first use. Callers lock the returned slot
    /// for the duration of one negotiation round.
    pub fn slot(&self, key: SessionKey) -> Arc<Mutex<SessionSlot>> {
        Arc::clone(
            &self
                .slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(SessionSlot::new()))),
        )
    }

    pub fn get(&self, key: SessionKey) -> Option<Arc<Mutex<SessionSlot>>> {
        self.slots.get(&key).map(|entry| Arc::clone(&entry))
    }

    /// Drop slots idle past their timeout. Removing a `Negotiating` slot
    /// drops its handshake, which disposes the native security context.
    /// Slots currently locked by a concurrent round are skipped.
    pub fn evict_stale(&self) {
        self.slots.retain(|_, slot| {
            let Some(guard) = slot.try_lock() else {
                return true;
            };
            let idle = guard.touched.elapsed();
            match guard.state {
                SlotState::Negotiating(_) => idle < self.handshake_timeout,
                SlotState::Idle | SlotState::Authenticated(_) => idle < self.session_idle_timeout,
            }
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
