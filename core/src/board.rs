//! Presentation-facing facade over the client core.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use votebox_client::{SessionStore, SuggestionService};
use votebox_types::{
    CommittedState, DraftSuggestion, Suggestion, SuggestionId, SuggestionStatus, VoteKind,
};
use votebox_utils::StatsCounter;

use crate::config::CoreConfig;
use crate::coordinator::MutationCoordinator;
use crate::error::ClientError;
use crate::resolver::{DuplicateResolver, ResolutionState};
use crate::scheduler::{SimilarityScheduler, SimilarityView};
use crate::store::{SortOrder, SuggestionStore};

/// One suggestion board: a store plus the components that write to it.
///
/// Every presentation intent goes through here; view models come back out
/// as snapshots or `watch` receivers.
pub struct Board {
    service: Arc<dyn SuggestionService>,
    session: Arc<dyn SessionStore>,
    store: SuggestionStore,
    coordinator: Arc<MutationCoordinator>,
    scheduler: SimilarityScheduler,
    resolver: DuplicateResolver,
}

impl Board {
    pub fn new(
        service: Arc<dyn SuggestionService>,
        session: Arc<dyn SessionStore>,
        config: CoreConfig,
    ) -> Self {
        let store = SuggestionStore::new();
        let coordinator = Arc::new(MutationCoordinator::new(
            service.clone(),
            session.clone(),
            store.clone(),
            config.voting_mode,
        ));
        let scheduler = SimilarityScheduler::new(service.clone(), session.clone(), config);
        let resolver = DuplicateResolver::new(
            service.clone(),
            session.clone(),
            store.clone(),
            coordinator.clone(),
        );
        Self {
            service,
            session,
            store,
            coordinator,
            scheduler,
            resolver,
        }
    }

    // ── Feed ───────────────────────────────────────────────────────────

    /// Reload the feed from the server.
    ///
    /// Suggestions with a vote in flight, or voted on while the listing was
    /// on its way, keep their local vote state.
    pub async fn refresh(&self, status: Option<SuggestionStatus>) -> Result<usize, ClientError> {
        let since = self.store.vote_epoch();
        let fresh = self.service.list(status).await.map_err(|e| self.escalate(e))?;
        let pending: HashSet<SuggestionId> = self.coordinator.pending_ids().into_iter().collect();
        let count = fresh.len();
        self.store.apply_listing(fresh, since, &pending);
        info!(count, ?status, "feed refreshed");
        Ok(count)
    }

    /// Suggestions the signed-in user has voted on.
    pub async fn my_votes(&self) -> Result<Vec<Suggestion>, ClientError> {
        self.service.my_votes().await.map_err(|e| self.escalate(e))
    }

    pub fn suggestions(&self, order: SortOrder) -> Vec<Suggestion> {
        self.store.sorted(order)
    }

    pub fn store(&self) -> &SuggestionStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn vote_stats(&self) -> &StatsCounter {
        self.coordinator.stats()
    }

    fn escalate(&self, e: votebox_client::ServiceError) -> ClientError {
        let err = ClientError::from(e);
        if err == ClientError::Unauthorized {
            self.session.on_unauthorized();
        }
        err
    }

    // ── Intents ────────────────────────────────────────────────────────

    pub async fn vote(&self, id: &SuggestionId, kind: VoteKind) -> Result<CommittedState, ClientError> {
        self.coordinator.mutate(id, kind).await
    }

    /// Free-text input outside the draft form (e.g. a search field).
    pub fn typed(&self, text: &str) {
        self.scheduler.on_input_change(text);
    }

    pub fn begin(&self) -> Result<(), ClientError> {
        self.resolver.begin()?;
        self.scheduler.clear();
        Ok(())
    }

    /// Update the draft. A changed title is fed to the similarity
    /// scheduler; description-only edits leave the current query alone.
    pub fn edit(&self, draft: DraftSuggestion) -> Result<(), ClientError> {
        let previous = self.resolver.draft();
        let title = draft.title.clone();
        self.resolver.edit(draft)?;
        if previous.map_or(true, |p| p.title.trim() != title.trim()) {
            self.scheduler.on_input_change(&title);
        }
        Ok(())
    }

    pub async fn submit(&self) -> Result<ResolutionState, ClientError> {
        let result = self.resolver.submit().await;
        self.after_step();
        result
    }

    pub async fn choose_vote_existing(
        &self,
        id: &SuggestionId,
    ) -> Result<ResolutionState, ClientError> {
        let result = self.resolver.choose_vote_existing(id).await;
        self.after_step();
        result
    }

    pub async fn choose_create_anyway(&self) -> Result<ResolutionState, ClientError> {
        let result = self.resolver.choose_create_anyway().await;
        self.after_step();
        result
    }

    pub fn cancel(&self) -> Result<(), ClientError> {
        self.resolver.cancel()?;
        self.after_step();
        Ok(())
    }

    pub async fn retry(&self) -> Result<ResolutionState, ClientError> {
        let result = self.resolver.retry().await;
        self.after_step();
        result
    }

    pub fn reset(&self) -> Result<(), ClientError> {
        self.resolver.reset()?;
        self.scheduler.clear();
        Ok(())
    }

    /// Resolved and abandoned drafts leave no similarity results behind.
    fn after_step(&self) {
        if matches!(
            self.resolver.state(),
            ResolutionState::Resolved { .. } | ResolutionState::Idle
        ) {
            self.scheduler.clear();
        }
    }

    // ── View models ────────────────────────────────────────────────────

    pub fn similarity(&self) -> SimilarityView {
        self.scheduler.view()
    }

    pub fn subscribe_similarity(&self) -> watch::Receiver<SimilarityView> {
        self.scheduler.subscribe()
    }

    pub fn resolution(&self) -> ResolutionState {
        self.resolver.state()
    }

    pub fn subscribe_resolution(&self) -> watch::Receiver<ResolutionState> {
        self.resolver.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use votebox_client::ServiceError;
    use votebox_nullables::{NullSession, NullSuggestionService, Op};
    use votebox_types::{SimilarityMatch, VoteState};

    use crate::scheduler::SimilarityStatus;

    fn board(service: &Arc<NullSuggestionService>) -> (Board, Arc<NullSession>) {
        let session = Arc::new(NullSession::authenticated());
        let board = Board::new(service.clone(), session.clone(), CoreConfig::default());
        (board, session)
    }

    #[tokio::test]
    async fn refresh_loads_the_feed() {
        let service = Arc::new(NullSuggestionService::new());
        service.insert(service.record("S1", "Better food options", 12));
        service.insert(service.record("S2", "Bike racks", 30));
        let (board, _) = board(&service);

        assert_eq!(board.refresh(None).await.unwrap(), 2);

        let feed = board.suggestions(SortOrder::Feed);
        assert_eq!(feed[0].id.as_str(), "S2");
        assert_eq!(board.suggestions(SortOrder::New)[0].id.as_str(), "S2");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_during_a_vote_keeps_the_guess() {
        let service = Arc::new(NullSuggestionService::new());
        service.insert(service.record("S1", "Better food options", 12));
        let (board, _) = board(&service);
        let board = Arc::new(board);
        board.refresh(None).await.unwrap();
        service.set_latency(Op::Vote, Duration::from_millis(300));

        let voter = board.clone();
        let vote = tokio::spawn(async move {
            voter.vote(&SuggestionId::new("S1"), VoteKind::Vote).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.refresh(None).await.unwrap();

        let s1 = board.store().get(&SuggestionId::new("S1")).unwrap();
        assert_eq!(s1.committed_state(), CommittedState::new(13, VoteState::Upvoted));
        vote.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn listing_older_than_a_committed_vote_does_not_revert_it() {
        let service = Arc::new(NullSuggestionService::new());
        service.insert(service.record("S1", "Better food options", 12));
        let (board, _) = board(&service);
        let board = Arc::new(board);
        board.refresh(None).await.unwrap();
        service.set_latency(Op::List, Duration::from_millis(500));

        let refresher = board.clone();
        let refresh = tokio::spawn(async move { refresher.refresh(None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let committed = board
            .vote(&SuggestionId::new("S1"), VoteKind::Vote)
            .await
            .unwrap();
        assert_eq!(committed, CommittedState::new(13, VoteState::Upvoted));
        assert!(!board.coordinator.is_pending(&SuggestionId::new("S1")));

        refresh.await.unwrap().unwrap();
        let s1 = board.store().get(&SuggestionId::new("S1")).unwrap();
        assert_eq!(s1.committed_state(), CommittedState::new(13, VoteState::Upvoted));

        // The next listing reflects the vote and is taken as is.
        board.refresh(None).await.unwrap();
        let s1 = board.store().get(&SuggestionId::new("S1")).unwrap();
        assert_eq!(s1.committed_state(), CommittedState::new(13, VoteState::Upvoted));
    }

    #[tokio::test]
    async fn unauthorized_refresh_escalates() {
        let service = Arc::new(NullSuggestionService::new());
        service.fail_next(Op::List, ServiceError::Unauthorized);
        let (board, session) = board(&service);

        assert_eq!(board.refresh(None).await.unwrap_err(), ClientError::Unauthorized);
        assert_eq!(session.unauthorized_signals(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn editing_the_draft_queries_similarity_and_resolving_clears_it() {
        let service = Arc::new(NullSuggestionService::new());
        service.script_similar(
            "Bike racks",
            vec![SimilarityMatch::new(SuggestionId::new("S9"), "Bicycle parking", 3, 0.6)],
        );
        let (board, _) = board(&service);

        board.begin().unwrap();
        board
            .edit(DraftSuggestion::new("Bike racks", None))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(board.similarity().status, SimilarityStatus::Results);

        board.submit().await.unwrap();
        assert_eq!(board.resolution().name(), "resolved");
        assert_eq!(board.similarity().status, SimilarityStatus::Idle);
        assert!(board.similarity().matches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn description_edits_do_not_requery() {
        let service = Arc::new(NullSuggestionService::new());
        let (board, _) = board(&service);

        board.begin().unwrap();
        board.edit(DraftSuggestion::new("Bike racks", None)).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(service.similar_queries(), ["Bike racks"]);

        board
            .edit(DraftSuggestion::new("Bike racks", Some("Near the east door".into())))
            .unwrap();
        board
            .edit(DraftSuggestion::new("Bike racks ", Some("Near the east entrance".into())))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(service.similar_queries(), ["Bike racks"]);
        assert_eq!(board.similarity().status, SimilarityStatus::NoMatches);

        board.edit(DraftSuggestion::new("Bike racks outside", None)).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(service.similar_queries(), ["Bike racks", "Bike racks outside"]);
    }
}
