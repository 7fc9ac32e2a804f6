//! Backend collaborators for the votebox client core.
//!
//! - [`SuggestionService`]: the request/response operations the core needs
//!   (list, create, vote, similarity, duplicate check).
//! - [`SessionStore`]: opaque token holder with an unauthorized signal.
//! - [`HttpSuggestionService`] / [`AuthClient`]: `reqwest` implementations
//!   against the REST backend.

pub mod error;
pub mod http;
pub mod service;
pub mod session;
pub mod wire;

pub use error::ServiceError;
pub use http::{ApiClient, AuthClient, HttpSuggestionService, DEFAULT_TIMEOUT};
pub use service::SuggestionService;
pub use session::{MemorySession, SessionStore};
