//! Fundamental types for the votebox suggestion client.
//!
//! This crate defines the values shared by every other crate in the workspace:
//! suggestion identifiers and records, vote states and kinds, similarity
//! matches and drafts.

pub mod error;
pub mod id;
pub mod similarity;
pub mod suggestion;
pub mod vote;

pub use error::TypesError;
pub use id::SuggestionId;
pub use similarity::{DuplicateCheck, SimilarityMatch};
pub use suggestion::{parse_timestamp, DraftSuggestion, Suggestion, SuggestionStatus, MAX_TITLE_LEN};
pub use vote::{CommittedState, VoteKind, VoteState, VotingMode};
