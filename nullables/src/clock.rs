//! Nullable clock: deterministic creation timestamps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

/// A clock that only moves when told to.
pub struct NullClock {
    current: Mutex<DateTime<Utc>>,
}

impl NullClock {
    pub fn new(initial_secs: i64) -> Self {
        let start = Utc
            .timestamp_opt(initial_secs, 0)
            .single()
            .unwrap_or_default();
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap()
    }

    /// Advance time by a number of seconds.
    pub fn advance(&self, secs: i64) {
        let mut current = self.current.lock().unwrap();
        *current += Duration::seconds(secs);
    }
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}
