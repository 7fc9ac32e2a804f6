//! The backend suggestion service, as the client core sees it.

use async_trait::async_trait;
use votebox_types::{
    CommittedState, DraftSuggestion, DuplicateCheck, SimilarityMatch, Suggestion, SuggestionId,
    SuggestionStatus, VoteKind,
};

use crate::error::ServiceError;

/// Request/response operations the core consumes.
///
/// Implementations must be cheap to share (`Arc<dyn SuggestionService>`).
/// None of the operations are retried by callers; a creation is issued
/// exactly once per commit, so implementations must not retry internally
/// either.
#[async_trait]
pub trait SuggestionService: Send + Sync {
    /// List suggestions in the server's feed order.
    async fn list(&self, status: Option<SuggestionStatus>)
        -> Result<Vec<Suggestion>, ServiceError>;

    async fn get(&self, id: &SuggestionId) -> Result<Suggestion, ServiceError>;

    async fn create(&self, draft: &DraftSuggestion) -> Result<Suggestion, ServiceError>;

    /// Apply a vote action; the answer is authoritative.
    async fn vote(&self, id: &SuggestionId, kind: VoteKind)
        -> Result<CommittedState, ServiceError>;

    /// Live-typing similarity search, best match first.
    async fn similar(&self, text: &str, limit: usize)
        -> Result<Vec<SimilarityMatch>, ServiceError>;

    /// Pre-submit duplicate check over the whole draft.
    async fn check_duplicate(&self, draft: &DraftSuggestion)
        -> Result<DuplicateCheck, ServiceError>;

    /// Suggestions the current user has voted on.
    async fn my_votes(&self) -> Result<Vec<Suggestion>, ServiceError>;

    /// Service liveness, as a short status string.
    async fn health(&self) -> Result<String, ServiceError>;
}
