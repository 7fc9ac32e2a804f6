//! Nullable infrastructure for deterministic testing.
//!
//! The client core talks to its collaborators (backend service, session
//! store) through traits. This crate provides test-friendly implementations
//! that:
//! - answer from in-memory state or scripted responses
//! - can be slowed down or made to fail per operation
//! - record every call for assertions
//! - never touch the network
//!
//! Latency uses `tokio::time`, so tests running with a paused clock stay
//! deterministic.

pub mod clock;
pub mod service;
pub mod session;

pub use clock::NullClock;
pub use service::{Call, NullSuggestionService, Op};
pub use session::NullSession;
