//! Nullable suggestion service: an in-memory backend with scripted answers.
//!
//! Votes are applied to server-side records the way the real backend does,
//! so tests can compare optimistic guesses against canonical answers.
//! Similarity and duplicate-check answers are scripted; latency and failures
//! can be injected per operation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use votebox_client::{ServiceError, SuggestionService};
use votebox_types::{
    CommittedState, DraftSuggestion, DuplicateCheck, SimilarityMatch, Suggestion, SuggestionId,
    SuggestionStatus, VoteKind, VoteState,
};

use crate::clock::NullClock;

/// Service operations, for latency/failure scripting and call counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Get,
    Create,
    Vote,
    Similar,
    CheckDuplicate,
    MyVotes,
}

/// A recorded call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    List(Option<SuggestionStatus>),
    Get(SuggestionId),
    Create(DraftSuggestion),
    Vote(SuggestionId, VoteKind),
    Similar(String),
    CheckDuplicate(DraftSuggestion),
    MyVotes,
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Self::List(_) => Op::List,
            Self::Get(_) => Op::Get,
            Self::Create(_) => Op::Create,
            Self::Vote(..) => Op::Vote,
            Self::Similar(_) => Op::Similar,
            Self::CheckDuplicate(_) => Op::CheckDuplicate,
            Self::MyVotes => Op::MyVotes,
        }
    }
}

#[derive(Default)]
struct Script {
    latency: HashMap<Op, Duration>,
    similar_latency: HashMap<String, Duration>,
    failures: HashMap<Op, VecDeque<ServiceError>>,
    similar: HashMap<String, Vec<SimilarityMatch>>,
    duplicate: Option<DuplicateCheck>,
}

/// In-memory backend for tests.
pub struct NullSuggestionService {
    records: Mutex<Vec<Suggestion>>,
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    clock: NullClock,
    next_id: Mutex<u64>,
}

impl NullSuggestionService {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
            clock: NullClock::default(),
            next_id: Mutex::new(1),
        }
    }

    /// Create a service whose backend already holds `records`.
    pub fn with_records(records: Vec<Suggestion>) -> Self {
        let service = Self::new();
        *service.records.lock().unwrap() = records;
        service
    }

    /// Build a suggestion record with the clock's current time.
    pub fn record(&self, id: &str, title: &str, vote_count: u32) -> Suggestion {
        self.clock.advance(60);
        Suggestion {
            id: SuggestionId::new(id),
            title: title.to_string(),
            description: None,
            vote_count,
            vote_state: VoteState::None,
            status: SuggestionStatus::Pending,
            created_at: self.clock.now(),
            author: "U1".to_string(),
        }
    }

    pub fn insert(&self, suggestion: Suggestion) {
        self.records.lock().unwrap().push(suggestion);
    }

    /// Server-side view of a record.
    pub fn server_record(&self, id: &SuggestionId) -> Option<Suggestion> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.id == id)
            .cloned()
    }

    pub fn server_len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Simulate votes by other members.
    pub fn add_foreign_votes(&self, id: &SuggestionId, votes: u32) {
        if let Some(s) = self.records.lock().unwrap().iter_mut().find(|s| &s.id == id) {
            s.vote_count += votes;
        }
    }

    pub fn set_latency(&self, op: Op, latency: Duration) {
        self.script.lock().unwrap().latency.insert(op, latency);
    }

    /// Latency for similarity queries on one exact text; overrides `set_latency`.
    pub fn set_similar_latency(&self, text: &str, latency: Duration) {
        self.script
            .lock()
            .unwrap()
            .similar_latency
            .insert(text.to_string(), latency);
    }

    /// Make the next call of `op` fail with `error` (queued, one per call).
    pub fn fail_next(&self, op: Op, error: ServiceError) {
        self.script
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn script_similar(&self, text: &str, matches: Vec<SimilarityMatch>) {
        self.script
            .lock()
            .unwrap()
            .similar
            .insert(text.to_string(), matches);
    }

    pub fn script_duplicate(&self, check: DuplicateCheck) {
        self.script.lock().unwrap().duplicate = Some(check);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    pub fn similar_queries(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Similar(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Record the call, wait out its latency and pop a scripted failure.
    async fn enter(&self, call: Call) -> Result<(), ServiceError> {
        let (latency, failure) = self.arrive(call);
        Self::respond(latency, failure).await
    }

    /// Record the call and take its scripted latency and failure.
    fn arrive(&self, call: Call) -> (Option<Duration>, Option<ServiceError>) {
        let op = call.op();
        let scripted = {
            let mut script = self.script.lock().unwrap();
            let latency = match &call {
                Call::Similar(text) => script.similar_latency.get(text).copied(),
                _ => None,
            }
            .or_else(|| script.latency.get(&op).copied());
            let failure = script.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (latency, failure)
        };
        self.calls.lock().unwrap().push(call);
        scripted
    }

    async fn respond(
        latency: Option<Duration>,
        failure: Option<ServiceError>,
    ) -> Result<(), ServiceError> {
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(id: &SuggestionId) -> ServiceError {
        ServiceError::Rejected {
            status: 404,
            detail: format!("Suggestion {id} not found"),
        }
    }
}

impl Default for NullSuggestionService {
    fn default() -> Self {
        Self::new()
    }
}

/// The backend's vote rules, applied to a server record.
fn apply_server_vote(record: &mut Suggestion, kind: VoteKind) -> CommittedState {
    let next = match (kind, record.vote_state) {
        (VoteKind::Vote, VoteState::None) => VoteState::Upvoted,
        (VoteKind::Vote, _) => VoteState::None,
        (VoteKind::Upvote, VoteState::Upvoted) => VoteState::None,
        (VoteKind::Upvote, _) => VoteState::Upvoted,
        (VoteKind::Downvote, VoteState::Downvoted) => VoteState::None,
        (VoteKind::Downvote, _) => VoteState::Downvoted,
        (VoteKind::Unvote, _) => VoteState::None,
    };
    let delta = next.weight() - record.vote_state.weight();
    record.vote_count = (record.vote_count as i64 + delta).max(0) as u32;
    record.vote_state = next;
    record.committed_state()
}

#[async_trait]
impl SuggestionService for NullSuggestionService {
    async fn list(
        &self,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<Suggestion>, ServiceError> {
        // The listing is read when the request arrives; latency delays the
        // answer, so writes made meanwhile are missing from it.
        let (latency, failure) = self.arrive(Call::List(status));
        let mut records: Vec<Suggestion> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        Self::respond(latency, failure).await?;
        Ok(records)
    }

    async fn get(&self, id: &SuggestionId) -> Result<Suggestion, ServiceError> {
        self.enter(Call::Get(id.clone())).await?;
        self.server_record(id).ok_or_else(|| Self::not_found(id))
    }

    async fn create(&self, draft: &DraftSuggestion) -> Result<Suggestion, ServiceError> {
        self.enter(Call::Create(draft.clone())).await?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = format!("N{}", *next);
            *next += 1;
            id
        };
        let mut record = self.record(&id, &draft.title, 0);
        record.description = draft.description.clone();
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn vote(
        &self,
        id: &SuggestionId,
        kind: VoteKind,
    ) -> Result<CommittedState, ServiceError> {
        self.enter(Call::Vote(id.clone(), kind)).await?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        Ok(apply_server_vote(record, kind))
    }

    async fn similar(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>, ServiceError> {
        self.enter(Call::Similar(text.to_string())).await?;
        let mut matches = self
            .script
            .lock()
            .unwrap()
            .similar
            .get(text)
            .cloned()
            .unwrap_or_default();
        matches.truncate(limit);
        Ok(matches)
    }

    async fn check_duplicate(
        &self,
        draft: &DraftSuggestion,
    ) -> Result<DuplicateCheck, ServiceError> {
        self.enter(Call::CheckDuplicate(draft.clone())).await?;
        Ok(self
            .script
            .lock()
            .unwrap()
            .duplicate
            .clone()
            .unwrap_or_default())
    }

    async fn my_votes(&self) -> Result<Vec<Suggestion>, ServiceError> {
        self.enter(Call::MyVotes).await?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.vote_state.has_voted())
            .cloned()
            .collect())
    }

    async fn health(&self) -> Result<String, ServiceError> {
        Ok("healthy".to_string())
    }
}
