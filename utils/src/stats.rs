//! Named event counters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed set of named counters, safe to bump from any task.
///
/// Names are declared up front; bumping an undeclared name is ignored so a
/// typo never panics in production paths.
pub struct StatsCounter {
    counters: BTreeMap<&'static str, AtomicU64>,
}

impl StatsCounter {
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            counters: names.iter().map(|&n| (n, AtomicU64::new(0))).collect(),
        }
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Current values, ordered by name.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.counters
            .iter()
            .map(|(&k, v)| (k, v.load(Ordering::Relaxed)))
            .collect()
    }
}

impl fmt::Display for StatsCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.snapshot() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}
