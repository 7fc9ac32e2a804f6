//! Duplicate resolution state machine.
//!
//! Decides whether a typed idea becomes a new suggestion or a vote on an
//! existing one:
//!
//! ```text
//! Idle -> Drafting -> CheckingDuplicates -> AwaitingDecision -> Submitting -> Resolved
//!                                        \-> Submitting (no duplicates) ----/
//! ```
//!
//! `Failed` is reachable from every async step and keeps the draft. The
//! machine never leaves `CheckingDuplicates` or `Submitting` except through
//! the task that entered it, so a second commit cannot start while one is in
//! flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use votebox_client::{SessionStore, SuggestionService};
use votebox_types::{
    CommittedState, DraftSuggestion, SimilarityMatch, Suggestion, SuggestionId, VoteState,
};

use crate::coordinator::MutationCoordinator;
use crate::error::ClientError;
use crate::store::SuggestionStore;

/// What a `Submitting` step is committing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Commit {
    /// Create the draft. `anyway` is set when duplicates were reported and
    /// overridden.
    Create { anyway: bool },
    /// Vote on an existing suggestion instead of creating one.
    VoteExisting(SuggestionId),
}

/// How a creation attempt ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Created(Suggestion),
    VotedExisting {
        id: SuggestionId,
        state: CommittedState,
    },
}

/// Where `retry()` goes from `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryTarget {
    /// Back to editing (creation or vote failed).
    Drafting,
    /// Re-run the duplicate check.
    CheckingDuplicates,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResolutionState {
    #[default]
    Idle,
    Drafting {
        draft: DraftSuggestion,
    },
    CheckingDuplicates {
        draft: DraftSuggestion,
    },
    AwaitingDecision {
        draft: DraftSuggestion,
        matches: Vec<SimilarityMatch>,
        message: Option<String>,
    },
    Submitting {
        draft: DraftSuggestion,
        commit: Commit,
    },
    Resolved {
        outcome: Resolution,
    },
    Failed {
        draft: DraftSuggestion,
        error: ClientError,
        retry: RetryTarget,
    },
}

impl ResolutionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Drafting { .. } => "drafting",
            Self::CheckingDuplicates { .. } => "checking duplicates",
            Self::AwaitingDecision { .. } => "awaiting decision",
            Self::Submitting { .. } => "submitting",
            Self::Resolved { .. } => "resolved",
            Self::Failed { .. } => "failed",
        }
    }

    /// The draft being worked on, if the state holds one.
    pub fn draft(&self) -> Option<&DraftSuggestion> {
        match self {
            Self::Drafting { draft }
            | Self::CheckingDuplicates { draft }
            | Self::AwaitingDecision { draft, .. }
            | Self::Submitting { draft, .. }
            | Self::Failed { draft, .. } => Some(draft),
            Self::Idle | Self::Resolved { .. } => None,
        }
    }

    /// Whether a network step owns the machine right now.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::CheckingDuplicates { .. } | Self::Submitting { .. }
        )
    }
}

pub struct DuplicateResolver {
    service: Arc<dyn SuggestionService>,
    session: Arc<dyn SessionStore>,
    store: SuggestionStore,
    coordinator: Arc<MutationCoordinator>,
    state: Mutex<ResolutionState>,
    view: watch::Sender<ResolutionState>,
}

impl DuplicateResolver {
    pub fn new(
        service: Arc<dyn SuggestionService>,
        session: Arc<dyn SessionStore>,
        store: SuggestionStore,
        coordinator: Arc<MutationCoordinator>,
    ) -> Self {
        let (view, _) = watch::channel(ResolutionState::Idle);
        Self {
            service,
            session,
            store,
            coordinator,
            state: Mutex::new(ResolutionState::Idle),
            view,
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.view.subscribe()
    }

    pub fn draft(&self) -> Option<DraftSuggestion> {
        self.lock().draft().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ResolutionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the current state and publish the result if it
    /// succeeds. `f` must leave the state untouched when it returns an error.
    fn update<T>(
        &self,
        f: impl FnOnce(&mut ResolutionState) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut state = self.lock();
        let out = f(&mut state)?;
        debug!(state = state.name(), "resolution state changed");
        self.view.send_replace(state.clone());
        Ok(out)
    }

    fn set(&self, next: ResolutionState) -> ResolutionState {
        let mut state = self.lock();
        *state = next.clone();
        debug!(state = state.name(), "resolution state changed");
        self.view.send_replace(next.clone());
        next
    }

    fn refuse(intent: &'static str, state: &ResolutionState) -> ClientError {
        ClientError::InvalidState {
            intent,
            state: state.name(),
        }
    }

    // ── Intents ────────────────────────────────────────────────────────

    /// Start a new creation attempt with an empty draft.
    pub fn begin(&self) -> Result<(), ClientError> {
        self.update(|state| match state {
            ResolutionState::Idle | ResolutionState::Resolved { .. } => {
                *state = ResolutionState::Drafting {
                    draft: DraftSuggestion::default(),
                };
                Ok(())
            }
            other => Err(Self::refuse("begin", other)),
        })
    }

    pub fn edit(&self, draft: DraftSuggestion) -> Result<(), ClientError> {
        self.update(|state| match state {
            ResolutionState::Drafting { .. } => {
                *state = ResolutionState::Drafting { draft };
                Ok(())
            }
            other => Err(Self::refuse("edit", other)),
        })
    }

    /// Validate the draft, run the duplicate check and, if nothing matches,
    /// create the suggestion.
    ///
    /// Returns the state the machine settled in (`AwaitingDecision` or
    /// `Resolved`). A validation failure leaves the machine in `Drafting`;
    /// a network failure moves it to `Failed`.
    pub async fn submit(&self) -> Result<ResolutionState, ClientError> {
        let draft = self.update(|state| match state {
            ResolutionState::Drafting { draft } => {
                draft.validate()?;
                let draft = draft.normalized();
                *state = ResolutionState::CheckingDuplicates {
                    draft: draft.clone(),
                };
                Ok(draft)
            }
            busy if busy.is_busy() => Err(ClientError::Busy(
                "the suggestion is already being submitted".to_string(),
            )),
            other => Err(Self::refuse("submit", other)),
        })?;
        self.check(draft).await
    }

    /// Vote on one of the reported matches instead of creating the draft.
    pub async fn choose_vote_existing(
        &self,
        id: &SuggestionId,
    ) -> Result<ResolutionState, ClientError> {
        let (draft, matches, message) = self.update(|state| match state {
            ResolutionState::AwaitingDecision {
                draft,
                matches,
                message,
            } => {
                if !matches.iter().any(|m| &m.suggestion_id == id) {
                    return Err(ClientError::Validation(format!(
                        "{id} is not one of the reported matches"
                    )));
                }
                let saved = (draft.clone(), matches.clone(), message.clone());
                *state = ResolutionState::Submitting {
                    draft: saved.0.clone(),
                    commit: Commit::VoteExisting(id.clone()),
                };
                Ok(saved)
            }
            other => Err(Self::refuse("vote existing", other)),
        })?;

        let step = Step::new(self, draft.clone());

        if !self.store.contains(id) {
            match self.service.get(id).await {
                Ok(suggestion) => {
                    self.store.insert_missing(suggestion);
                }
                Err(e) => return Err(step.fail(ClientError::from(e), RetryTarget::Drafting)),
            }
        }

        let already = self
            .store
            .get(id)
            .map(|s| s.committed_state())
            .filter(|s| s.vote_state == VoteState::Upvoted);
        if let Some(state) = already {
            info!(suggestion = %id, "draft resolved onto an existing vote");
            return Ok(step.settle(ResolutionState::Resolved {
                outcome: Resolution::VotedExisting {
                    id: id.clone(),
                    state,
                },
            }));
        }

        let kind = self.coordinator.mode().affirmative();
        match self.coordinator.mutate(id, kind).await {
            Ok(state) => {
                info!(suggestion = %id, vote_count = state.vote_count, "draft resolved as a vote");
                Ok(step.settle(ResolutionState::Resolved {
                    outcome: Resolution::VotedExisting {
                        id: id.clone(),
                        state,
                    },
                }))
            }
            Err(err @ ClientError::Busy(_)) => {
                step.settle(ResolutionState::AwaitingDecision {
                    draft,
                    matches,
                    message,
                });
                Err(err)
            }
            // The coordinator already escalated an unauthorized answer.
            Err(err) => Err(step.record_failure(err, RetryTarget::Drafting)),
        }
    }

    /// Create the draft even though duplicates were reported.
    pub async fn choose_create_anyway(&self) -> Result<ResolutionState, ClientError> {
        let draft = self.update(|state| match state {
            ResolutionState::AwaitingDecision { draft, .. } => {
                let draft = draft.clone();
                *state = ResolutionState::Submitting {
                    draft: draft.clone(),
                    commit: Commit::Create { anyway: true },
                };
                Ok(draft)
            }
            other => Err(Self::refuse("create anyway", other)),
        })?;
        self.create(draft).await
    }

    /// Step back: decision → drafting, drafting → idle, failed → drafting.
    pub fn cancel(&self) -> Result<(), ClientError> {
        self.update(|state| {
            let next = match state {
                ResolutionState::AwaitingDecision { draft, .. }
                | ResolutionState::Failed { draft, .. } => ResolutionState::Drafting {
                    draft: draft.clone(),
                },
                ResolutionState::Drafting { .. } => ResolutionState::Idle,
                other => return Err(Self::refuse("cancel", other)),
            };
            *state = next;
            Ok(())
        })
    }

    /// Leave `Failed` by re-running the check or going back to editing.
    pub async fn retry(&self) -> Result<ResolutionState, ClientError> {
        let target = self.update(|state| match state {
            ResolutionState::Failed { draft, retry, .. } => {
                let draft = draft.clone();
                let target = *retry;
                *state = match target {
                    RetryTarget::CheckingDuplicates => ResolutionState::CheckingDuplicates {
                        draft: draft.clone(),
                    },
                    RetryTarget::Drafting => ResolutionState::Drafting {
                        draft: draft.clone(),
                    },
                };
                Ok((target, draft))
            }
            other => Err(Self::refuse("retry", other)),
        })?;
        match target {
            (RetryTarget::CheckingDuplicates, draft) => self.check(draft).await,
            (RetryTarget::Drafting, _) => Ok(self.state()),
        }
    }

    pub fn reset(&self) -> Result<(), ClientError> {
        self.update(|state| match state {
            ResolutionState::Idle
            | ResolutionState::Resolved { .. }
            | ResolutionState::Failed { .. } => {
                *state = ResolutionState::Idle;
                Ok(())
            }
            other => Err(Self::refuse("reset", other)),
        })
    }

    // ── Async steps ────────────────────────────────────────────────────

    async fn check(&self, draft: DraftSuggestion) -> Result<ResolutionState, ClientError> {
        let step = Step::new(self, draft.clone());
        let check = match self.service.check_duplicate(&draft).await {
            Ok(check) => check,
            Err(e) => {
                return Err(step.fail(ClientError::from(e), RetryTarget::CheckingDuplicates))
            }
        };

        if check.has_duplicates() {
            debug!(
                matches = check.matches.len(),
                top = ?check.top().map(|m| m.suggestion_id.as_str()),
                "duplicates reported"
            );
            return Ok(step.settle(ResolutionState::AwaitingDecision {
                draft,
                matches: check.matches,
                message: check.message,
            }));
        }

        step.settle(ResolutionState::Submitting {
            draft: draft.clone(),
            commit: Commit::Create { anyway: false },
        });
        self.create(draft).await
    }

    async fn create(&self, draft: DraftSuggestion) -> Result<ResolutionState, ClientError> {
        let step = Step::new(self, draft.clone());
        match self.service.create(&draft).await {
            Ok(created) => {
                info!(suggestion = %created.id, title = %created.title, "suggestion created");
                self.store.insert_front(created.clone());
                Ok(step.settle(ResolutionState::Resolved {
                    outcome: Resolution::Created(created),
                }))
            }
            Err(e) => Err(step.fail(ClientError::from(e), RetryTarget::Drafting)),
        }
    }
}

/// Owns the machine while a network step runs. If the step's future is
/// dropped before it settles, the machine moves to `Failed` instead of
/// staying stuck in a busy state.
struct Step<'a> {
    resolver: &'a DuplicateResolver,
    draft: Option<DraftSuggestion>,
}

impl<'a> Step<'a> {
    fn new(resolver: &'a DuplicateResolver, draft: DraftSuggestion) -> Self {
        Self {
            resolver,
            draft: Some(draft),
        }
    }

    fn settle(mut self, next: ResolutionState) -> ResolutionState {
        self.draft = None;
        self.resolver.set(next)
    }

    /// Record a failed service call, escalating an unauthorized answer.
    fn fail(self, err: ClientError, retry: RetryTarget) -> ClientError {
        if err == ClientError::Unauthorized {
            self.resolver.session.on_unauthorized();
        }
        self.record_failure(err, retry)
    }

    fn record_failure(mut self, err: ClientError, retry: RetryTarget) -> ClientError {
        let draft = self.draft.take().unwrap_or_default();
        warn!(error = %err, ?retry, "suggestion submission failed");
        self.resolver.set(ResolutionState::Failed {
            draft,
            error: err.clone(),
            retry,
        });
        err
    }
}

impl Drop for Step<'_> {
    fn drop(&mut self) {
        if let Some(draft) = self.draft.take() {
            self.resolver.set(ResolutionState::Failed {
                draft,
                error: ClientError::Network("request abandoned before it completed".to_string()),
                retry: RetryTarget::Drafting,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use votebox_client::ServiceError;
    use votebox_nullables::{NullSession, NullSuggestionService, Op};
    use votebox_types::{DuplicateCheck, VotingMode};

    struct Fixture {
        service: Arc<NullSuggestionService>,
        session: Arc<NullSession>,
        store: SuggestionStore,
        resolver: DuplicateResolver,
    }

    fn fixture() -> Fixture {
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
            VotingMode::Toggle,
        ));
        let resolver =
            DuplicateResolver::new(service.clone(), session.clone(), store.clone(), coordinator);
        Fixture {
            service,
            session,
            store,
            resolver,
        }
    }

    fn s1_match() -> DuplicateCheck {
        DuplicateCheck {
            duplicate_found: true,
            matches: vec![SimilarityMatch::new(
                SuggestionId::new("S1"),
                "Better food options",
                12,
                0.87,
            )],
            message: Some("Similar suggestion found".to_string()),
        }
    }

    fn drafting(f: &Fixture, title: &str) {
        f.resolver.begin().unwrap();
        f.resolver
            .edit(DraftSuggestion::new(title, None))
            .unwrap();
    }

    #[tokio::test]
    async fn empty_title_is_refused_locally() {
        let f = fixture();
        drafting(&f, "   ");

        let err = f.resolver.submit().await.unwrap_err();

        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(f.resolver.state().name(), "drafting");
        assert_eq!(f.service.call_count(Op::CheckDuplicate), 0);
    }

    #[tokio::test]
    async fn no_duplicates_creates_directly() {
        let f = fixture();
        drafting(&f, "  Bike racks  ");

        let state = f.resolver.submit().await.unwrap();

        let ResolutionState::Resolved {
            outcome: Resolution::Created(created),
        } = state
        else {
            panic!("expected a created suggestion");
        };
        assert_eq!(created.title, "Bike racks");
        assert_eq!(f.store.len(), 2);
        assert_eq!(f.store.snapshot()[0].id, created.id);
        assert!(f.resolver.draft().is_none());
    }

    #[tokio::test]
    async fn duplicates_wait_for_a_decision() {
        let f = fixture();
        f.service.script_duplicate(s1_match());
        drafting(&f, "Better food options");

        let state = f.resolver.submit().await.unwrap();

        assert!(matches!(state, ResolutionState::AwaitingDecision { ref matches, .. } if matches.len() == 1));
        assert_eq!(f.service.call_count(Op::Create), 0);
    }

    #[tokio::test]
    async fn vote_existing_never_creates() {
        let f = fixture();
        f.service.script_duplicate(s1_match());
        drafting(&f, "Better food options");
        f.resolver.submit().await.unwrap();

        let state = f
            .resolver
            .choose_vote_existing(&SuggestionId::new("S1"))
            .await
            .unwrap();

        assert!(matches!(
            state,
            ResolutionState::Resolved {
                outcome: Resolution::VotedExisting { .. }
            }
        ));
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.store.get(&SuggestionId::new("S1")).unwrap().vote_count, 13);
        assert_eq!(f.service.call_count(Op::Create), 0);
    }

    #[tokio::test]
    async fn vote_existing_rejects_unlisted_ids() {
        let f = fixture();
        f.service.script_duplicate(s1_match());
        drafting(&f, "Better food options");
        f.resolver.submit().await.unwrap();

        let err = f
            .resolver
            .choose_vote_existing(&SuggestionId::new("S7"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(f.resolver.state().name(), "awaiting decision");
    }

    #[tokio::test]
    async fn already_voted_match_resolves_without_a_call() {
        let f = fixture();
        f.store.set_vote_state(
            &SuggestionId::new("S1"),
            CommittedState::new(13, VoteState::Upvoted),
        );
        f.service.script_duplicate(s1_match());
        drafting(&f, "Better food options");
        f.resolver.submit().await.unwrap();

        f.resolver
            .choose_vote_existing(&SuggestionId::new("S1"))
            .await
            .unwrap();

        assert_eq!(f.service.call_count(Op::Vote), 0);
        assert_eq!(f.store.get(&SuggestionId::new("S1")).unwrap().vote_count, 13);
    }

    #[tokio::test]
    async fn unloaded_match_is_fetched_first() {
        let f = fixture();
        let s2 = f.service.record("S2", "Healthier snacks", 4);
        f.service.insert(s2);
        f.service.script_duplicate(DuplicateCheck {
            duplicate_found: true,
            matches: vec![SimilarityMatch::new(
                SuggestionId::new("S2"),
                "Healthier snacks",
                4,
                0.7,
            )],
            message: None,
        });
        drafting(&f, "Healthy snacks");
        f.resolver.submit().await.unwrap();

        f.resolver
            .choose_vote_existing(&SuggestionId::new("S2"))
            .await
            .unwrap();

        assert_eq!(f.service.call_count(Op::Get), 1);
        assert_eq!(f.store.get(&SuggestionId::new("S2")).unwrap().vote_count, 5);
    }

    #[tokio::test]
    async fn create_anyway_adds_one() {
        let f = fixture();
        f.service.script_duplicate(s1_match());
        drafting(&f, "Better food options");
        f.resolver.submit().await.unwrap();

        f.resolver.choose_create_anyway().await.unwrap();

        assert_eq!(f.store.len(), 2);
        assert_eq!(f.store.get(&SuggestionId::new("S1")).unwrap().vote_count, 12);
        assert_eq!(f.service.call_count(Op::Vote), 0);
    }

    #[tokio::test]
    async fn cancel_keeps_the_draft() {
        let f = fixture();
        f.service.script_duplicate(s1_match());
        drafting(&f, "Better food options");
        f.resolver.submit().await.unwrap();

        f.resolver.cancel().unwrap();

        assert_eq!(
            f.resolver.state(),
            ResolutionState::Drafting {
                draft: DraftSuggestion::new("Better food options", None)
            }
        );
        f.resolver.cancel().unwrap();
        assert_eq!(f.resolver.state(), ResolutionState::Idle);
    }

    #[tokio::test]
    async fn failed_check_retries_the_check() {
        let f = fixture();
        f.service
            .fail_next(Op::CheckDuplicate, ServiceError::Network("down".into()));
        drafting(&f, "Bike racks");

        assert!(f.resolver.submit().await.is_err());
        assert!(matches!(
            f.resolver.state(),
            ResolutionState::Failed {
                retry: RetryTarget::CheckingDuplicates,
                ..
            }
        ));

        let state = f.resolver.retry().await.unwrap();
        assert_eq!(state.name(), "resolved");
        assert_eq!(f.service.call_count(Op::CheckDuplicate), 2);
        assert_eq!(f.service.call_count(Op::Create), 1);
    }

    #[tokio::test]
    async fn failed_create_returns_to_drafting() {
        let f = fixture();
        f.service.fail_next(
            Op::Create,
            ServiceError::Rejected {
                status: 500,
                detail: "boom".into(),
            },
        );
        drafting(&f, "Bike racks");

        let err = f.resolver.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::ServerRejected { status: 500, .. }));
        assert_eq!(f.store.len(), 1);

        f.resolver.retry().await.unwrap();
        assert_eq!(
            f.resolver.draft(),
            Some(DraftSuggestion::new("Bike racks", None))
        );
        assert_eq!(f.resolver.state().name(), "drafting");
    }

    #[tokio::test]
    async fn unauthorized_check_escalates() {
        let f = fixture();
        f.service
            .fail_next(Op::CheckDuplicate, ServiceError::Unauthorized);
        drafting(&f, "Bike racks");

        assert_eq!(
            f.resolver.submit().await.unwrap_err(),
            ClientError::Unauthorized
        );
        assert_eq!(f.session.unauthorized_signals(), 1);
    }

    #[tokio::test]
    async fn intents_in_the_wrong_state_are_refused() {
        let f = fixture();
        assert!(matches!(
            f.resolver.edit(DraftSuggestion::new("x", None)),
            Err(ClientError::InvalidState { intent: "edit", state: "idle" })
        ));
        assert!(f.resolver.choose_create_anyway().await.is_err());
        f.resolver.begin().unwrap();
        assert!(f.resolver.begin().is_err());
        assert_eq!(f.resolver.state().name(), "drafting");
    }
}
