//! Nullable session: records unauthorized signals instead of redirecting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use votebox_client::SessionStore;

pub struct NullSession {
    token: Mutex<Option<String>>,
    unauthorized_signals: AtomicUsize,
}

impl NullSession {
    /// A session that starts logged in.
    pub fn authenticated() -> Self {
        Self {
            token: Mutex::new(Some("null-token".to_string())),
            unauthorized_signals: AtomicUsize::new(0),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            token: Mutex::new(None),
            unauthorized_signals: AtomicUsize::new(0),
        }
    }

    /// How many times the core escalated an unauthorized response.
    pub fn unauthorized_signals(&self) -> usize {
        self.unauthorized_signals.load(Ordering::SeqCst)
    }
}

impl Default for NullSession {
    fn default() -> Self {
        Self::authenticated()
    }
}

impl SessionStore for NullSession {
    fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn set_token(&self, token: String) {
        *self.token.lock().unwrap() = Some(token);
    }

    fn clear(&self) {
        *self.token.lock().unwrap() = None;
    }

    fn on_unauthorized(&self) {
        self.unauthorized_signals.fetch_add(1, Ordering::SeqCst);
        self.clear();
    }
}
