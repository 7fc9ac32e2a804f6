//! Client core for a suggestion-voting board.
//!
//! - [`SuggestionStore`]: ordered suggestions, the single source of truth
//!   for rendering
//! - [`MutationCoordinator`]: optimistic vote/unvote with rollback, one
//!   mutation per suggestion at a time
//! - [`SimilarityScheduler`]: debounced similarity queries that only ever
//!   publish the freshest answer
//! - [`DuplicateResolver`]: the create-or-vote-existing workflow for a new
//!   suggestion
//! - [`Board`]: the facade the presentation layer talks to
//!
//! The backend and the session are reached through the
//! [`votebox_client::SuggestionService`] and [`votebox_client::SessionStore`]
//! traits.

pub mod board;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod vote;

pub use board::Board;
pub use config::{ConfigError, CoreConfig};
pub use coordinator::{MutationCoordinator, PendingMutation};
pub use error::ClientError;
pub use resolver::{Commit, DuplicateResolver, Resolution, ResolutionState, RetryTarget};
pub use scheduler::{SimilarityScheduler, SimilarityStatus, SimilarityView};
pub use store::{SortOrder, SuggestionStore};
pub use vote::transition;
