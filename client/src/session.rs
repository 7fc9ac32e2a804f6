//! Session token holder.

use std::sync::{Mutex, PoisonError};

/// Opaque holder of the caller's credentials.
///
/// The core only asks whether a session exists and reports when the server
/// refused it; it never looks inside the token.
pub trait SessionStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn set_token(&self, token: String);

    fn clear(&self);

    /// Escalation: the server refused the session. Implementations drop the
    /// token and arrange for the user to re-authenticate.
    fn on_unauthorized(&self);
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    reauth_required: bool,
}

/// In-memory session; nothing is persisted.
#[derive(Default)]
pub struct MemorySession {
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token.into());
        session
    }

    /// Whether an unauthorized signal arrived since the last `set_token`.
    pub fn reauth_required(&self) -> bool {
        self.lock().reauth_required
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySession {
    fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    fn set_token(&self, token: String) {
        let mut state = self.lock();
        state.token = Some(token);
        state.reauth_required = false;
    }

    fn clear(&self) {
        self.lock().token = None;
    }

    fn on_unauthorized(&self) {
        let mut state = self.lock();
        state.token = None;
        state.reauth_required = true;
        tracing::warn!("session rejected by server, re-authentication required");
    }
}
