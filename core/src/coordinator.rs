//! Optimistic mutation coordinator.
//!
//! Serializes vote mutations per suggestion: the local change is applied
//! before the request leaves, the server's canonical answer overwrites it on
//! success, and the original snapshot is restored on failure. At most one
//! mutation per suggestion id is in flight; a second one is refused with
//! [`ClientError::Busy`] instead of being queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use votebox_client::{SessionStore, SuggestionService};
use votebox_types::{CommittedState, SuggestionId, VoteKind, VotingMode};
use votebox_utils::StatsCounter;

use crate::error::ClientError;
use crate::store::SuggestionStore;
use crate::vote::transition;

pub const MUTATIONS_STARTED: &str = "mutations_started";
pub const MUTATIONS_COMMITTED: &str = "mutations_committed";
pub const MUTATIONS_ROLLED_BACK: &str = "mutations_rolled_back";
pub const MUTATIONS_REJECTED_BUSY: &str = "mutations_rejected_busy";

/// An unconfirmed vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMutation {
    pub suggestion_id: SuggestionId,
    pub kind: VoteKind,
    /// State before the optimistic change; restored on failure.
    pub original: CommittedState,
}

pub struct MutationCoordinator {
    service: Arc<dyn SuggestionService>,
    session: Arc<dyn SessionStore>,
    store: SuggestionStore,
    mode: VotingMode,
    pending: Mutex<HashMap<SuggestionId, PendingMutation>>,
    stats: StatsCounter,
}

impl MutationCoordinator {
    pub fn new(
        service: Arc<dyn SuggestionService>,
        session: Arc<dyn SessionStore>,
        store: SuggestionStore,
        mode: VotingMode,
    ) -> Self {
        Self {
            service,
            session,
            store,
            mode,
            pending: Mutex::new(HashMap::new()),
            stats: StatsCounter::new(&[
                MUTATIONS_STARTED,
                MUTATIONS_COMMITTED,
                MUTATIONS_ROLLED_BACK,
                MUTATIONS_REJECTED_BUSY,
            ]),
        }
    }

    pub fn mode(&self) -> VotingMode {
        self.mode
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    pub fn is_pending(&self, id: &SuggestionId) -> bool {
        self.lock_pending().contains_key(id)
    }

    pub fn pending_ids(&self) -> Vec<SuggestionId> {
        self.lock_pending().keys().cloned().collect()
    }

    /// The unconfirmed vote on `id`, if one is in flight.
    pub fn pending(&self, id: &SuggestionId) -> Option<PendingMutation> {
        self.lock_pending().get(id).cloned()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<SuggestionId, PendingMutation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `kind` to suggestion `id`.
    ///
    /// Local refusals (`Validation`, `Busy`, `NotFound`, `Unauthorized` for an
    /// anonymous session) make no network call. Otherwise exactly one request
    /// is sent and never retried.
    pub async fn mutate(
        &self,
        id: &SuggestionId,
        kind: VoteKind,
    ) -> Result<CommittedState, ClientError> {
        if !self.mode.accepts(kind) {
            return Err(ClientError::Validation(format!(
                "{kind} is not available in {:?} voting mode",
                self.mode
            )));
        }
        if !self.session.is_authenticated() {
            self.session.on_unauthorized();
            return Err(ClientError::Unauthorized);
        }

        let guard = self.admit(id, kind)?;

        match self.service.vote(id, kind).await {
            Ok(committed) => {
                guard.commit(committed);
                self.stats.increment(MUTATIONS_COMMITTED);
                info!(
                    suggestion = %id,
                    %kind,
                    vote_count = committed.vote_count,
                    vote_state = ?committed.vote_state,
                    "vote committed"
                );
                Ok(committed)
            }
            Err(e) => {
                let err = ClientError::from(e);
                drop(guard);
                warn!(suggestion = %id, %kind, error = %err, "vote rolled back");
                if err == ClientError::Unauthorized {
                    self.session.on_unauthorized();
                }
                Err(err)
            }
        }
    }

    /// Check preconditions, apply the optimistic state and open the pending
    /// entry, all under one lock so two callers cannot both be admitted.
    fn admit(&self, id: &SuggestionId, kind: VoteKind) -> Result<InFlight<'_>, ClientError> {
        let mut pending = self.lock_pending();
        if pending.contains_key(id) {
            self.stats.increment(MUTATIONS_REJECTED_BUSY);
            debug!(suggestion = %id, %kind, "mutation refused, another is in flight");
            return Err(ClientError::Busy(format!(
                "a vote on {id} is already in progress"
            )));
        }
        let original = self
            .store
            .get(id)
            .map(|s| s.committed_state())
            .ok_or_else(|| ClientError::NotFound(id.clone()))?;
        let optimistic = transition(self.mode, original, kind)?;

        self.store.set_vote_state(id, optimistic);
        pending.insert(
            id.clone(),
            PendingMutation {
                suggestion_id: id.clone(),
                kind,
                original,
            },
        );
        self.stats.increment(MUTATIONS_STARTED);
        debug!(
            suggestion = %id,
            %kind,
            from = original.vote_count,
            to = optimistic.vote_count,
            "optimistic vote applied"
        );

        Ok(InFlight {
            coordinator: self,
            id: id.clone(),
            original,
            settled: false,
        })
    }
}

/// Owns a pending entry. Dropping it unsettled rolls the store back, so a
/// cancelled `mutate` future never leaves an orphaned guess behind.
struct InFlight<'a> {
    coordinator: &'a MutationCoordinator,
    id: SuggestionId,
    original: CommittedState,
    settled: bool,
}

impl InFlight<'_> {
    fn commit(mut self, committed: CommittedState) {
        let mut pending = self.coordinator.lock_pending();
        self.coordinator.store.set_vote_state(&self.id, committed);
        pending.remove(&self.id);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut pending = self.coordinator.lock_pending();
        self.coordinator.store.set_vote_state(&self.id, self.original);
        pending.remove(&self.id);
        self.coordinator.stats.increment(MUTATIONS_ROLLED_BACK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use votebox_client::ServiceError;
    use votebox_nullables::{NullSession, NullSuggestionService, Op};
    use votebox_types::VoteState;

    struct Fixture {
        service: Arc<NullSuggestionService>,
        session: Arc<NullSession>,
        store: SuggestionStore,
        coordinator: Arc<MutationCoordinator>,
    }

    fn fixture(mode: VotingMode) -> Fixture {
        let service = Arc::new(NullSuggestionService::new());
        let s1 = service.record("S1", "Better food options", 12);
        service.insert(s1.clone());
        let store = SuggestionStore::new();
        store.replace_all(vec![s1]);
        let session = Arc::new(NullSession::authenticated());
        let coordinator = Arc::new(MutationCoordinator::new(
            service.clone(),
            session.clone(),
            store.clone(),
            mode,
        ));
        Fixture {
            service,
            session,
            store,
            coordinator,
        }
    }

    fn s1() -> SuggestionId {
        SuggestionId::new("S1")
    }

    #[tokio::test]
    async fn commit_takes_server_state() {
        let f = fixture(VotingMode::Toggle);
        f.service.add_foreign_votes(&s1(), 3);

        let committed = f.coordinator.mutate(&s1(), VoteKind::Vote).await.unwrap();

        assert_eq!(committed, CommittedState::new(16, VoteState::Upvoted));
        assert_eq!(f.store.get(&s1()).unwrap().vote_count, 16);
        assert!(!f.coordinator.is_pending(&s1()));
        assert_eq!(f.coordinator.stats().get(MUTATIONS_COMMITTED), 1);
    }

    #[tokio::test]
    async fn toggle_twice_is_identity() {
        let f = fixture(VotingMode::Toggle);
        let before = f.store.get(&s1()).unwrap().committed_state();
        f.coordinator.mutate(&s1(), VoteKind::Vote).await.unwrap();
        f.coordinator.mutate(&s1(), VoteKind::Vote).await.unwrap();
        assert_eq!(f.store.get(&s1()).unwrap().committed_state(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_state_is_visible_while_in_flight() {
        let f = fixture(VotingMode::Toggle);
        f.service.set_latency(Op::Vote, Duration::from_millis(200));

        let coordinator = f.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.mutate(&s1(), VoteKind::Vote).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(f.store.get(&s1()).unwrap().vote_count, 13);
        assert!(f.coordinator.is_pending(&s1()));
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_vote_exposes_kind_and_snapshot() {
        let f = fixture(VotingMode::Toggle);
        f.service.set_latency(Op::Vote, Duration::from_millis(200));

        let coordinator = f.coordinator.clone();
        let task = tokio::spawn(async move { coordinator.mutate(&s1(), VoteKind::Vote).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            f.coordinator.pending(&s1()),
            Some(PendingMutation {
                suggestion_id: s1(),
                kind: VoteKind::Vote,
                original: CommittedState::new(12, VoteState::None),
            })
        );
        task.await.unwrap().unwrap();
        assert_eq!(f.coordinator.pending(&s1()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn second_mutation_is_busy() {
        let f = fixture(VotingMode::Toggle);
        f.service.set_latency(Op::Vote, Duration::from_millis(200));

        let coordinator = f.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.mutate(&s1(), VoteKind::Vote).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = f.coordinator.mutate(&s1(), VoteKind::Vote).await;
        assert!(matches!(second, Err(ClientError::Busy(_))));

        first.await.unwrap().unwrap();
        assert_eq!(f.service.call_count(Op::Vote), 1);
        assert_eq!(f.coordinator.stats().get(MUTATIONS_REJECTED_BUSY), 1);
    }

    #[tokio::test]
    async fn failure_restores_original() {
        let f = fixture(VotingMode::Toggle);
        f.service
            .fail_next(Op::Vote, ServiceError::Network("timeout".into()));

        let err = f.coordinator.mutate(&s1(), VoteKind::Vote).await.unwrap_err();

        assert!(matches!(err, ClientError::Network(_)));
        assert_eq!(
            f.store.get(&s1()).unwrap().committed_state(),
            CommittedState::new(12, VoteState::None)
        );
        assert!(!f.coordinator.is_pending(&s1()));
        assert_eq!(f.coordinator.stats().get(MUTATIONS_ROLLED_BACK), 1);
    }

    #[tokio::test]
    async fn unauthorized_escalates_to_session() {
        let f = fixture(VotingMode::Toggle);
        f.service.fail_next(Op::Vote, ServiceError::Unauthorized);

        let err = f.coordinator.mutate(&s1(), VoteKind::Vote).await.unwrap_err();

        assert_eq!(err, ClientError::Unauthorized);
        assert_eq!(f.session.unauthorized_signals(), 1);
        assert_eq!(f.store.get(&s1()).unwrap().vote_count, 12);
    }

    #[tokio::test]
    async fn anonymous_session_makes_no_call() {
        let f = fixture(VotingMode::Toggle);
        f.session.clear();

        let err = f.coordinator.mutate(&s1(), VoteKind::Vote).await.unwrap_err();

        assert_eq!(err, ClientError::Unauthorized);
        assert_eq!(f.service.call_count(Op::Vote), 0);
    }

    #[tokio::test]
    async fn local_refusals_make_no_call() {
        let f = fixture(VotingMode::Toggle);

        let missing = f
            .coordinator
            .mutate(&SuggestionId::new("S9"), VoteKind::Vote)
            .await;
        assert!(matches!(missing, Err(ClientError::NotFound(_))));

        let unvote = f.coordinator.mutate(&s1(), VoteKind::Unvote).await;
        assert!(matches!(unvote, Err(ClientError::Validation(_))));

        let wrong_mode = f.coordinator.mutate(&s1(), VoteKind::Upvote).await;
        assert!(matches!(wrong_mode, Err(ClientError::Validation(_))));

        assert_eq!(f.service.call_count(Op::Vote), 0);
        assert!(!f.coordinator.is_pending(&s1()));
    }

    #[tokio::test]
    async fn directional_switch_is_confirmed_by_server() {
        let f = fixture(VotingMode::Directional);
        f.coordinator.mutate(&s1(), VoteKind::Upvote).await.unwrap();
        let committed = f.coordinator.mutate(&s1(), VoteKind::Downvote).await.unwrap();
        assert_eq!(committed, CommittedState::new(11, VoteState::Downvoted));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_mutation_rolls_back() {
        let f = fixture(VotingMode::Toggle);
        f.service.set_latency(Op::Vote, Duration::from_secs(5));

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            f.coordinator.mutate(&s1(), VoteKind::Vote),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(f.store.get(&s1()).unwrap().vote_count, 12);
        assert!(!f.coordinator.is_pending(&s1()));
    }
}
