//! Suggestion store: the single source of truth the presentation renders.
//!
//! Reads are public and return owned snapshots. Writes are crate-private:
//! only the mutation coordinator (vote state), the duplicate resolver (new
//! entries) and the board's refresh (wholesale replacement) may change the
//! contents. Every write bumps a revision published on a `watch` channel.
//!
//! Vote writes are also stamped with a vote epoch. A refresh records the
//! epoch before it asks the server, and any entry voted on after that point
//! keeps its local state: the listing was read before the vote landed and
//! cannot overrule the server's own answer to it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use votebox_types::{CommittedState, Suggestion, SuggestionId};

/// Display orderings offered by the feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Server order (most voted first at load time), with local inserts on top.
    #[default]
    Feed,
    /// Highest vote count first.
    Top,
    /// Newest first.
    New,
}

#[derive(Default)]
struct Contents {
    items: Vec<Suggestion>,
    vote_epoch: u64,
    /// Epoch of the latest vote write per id.
    voted_at: HashMap<SuggestionId, u64>,
}

struct StoreInner {
    contents: Mutex<Contents>,
    revision: watch::Sender<u64>,
}

/// Ordered, shared collection of suggestions.
#[derive(Clone)]
pub struct SuggestionStore {
    inner: Arc<StoreInner>,
}

impl SuggestionStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                contents: Mutex::new(Contents::default()),
                revision,
            }),
        }
    }

    fn contents(&self) -> MutexGuard<'_, Contents> {
        self.inner
            .contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|r| *r += 1);
    }

    // ── Reads ──────────────────────────────────────────────────────────

    pub fn get(&self, id: &SuggestionId) -> Option<Suggestion> {
        self.contents().items.iter().find(|s| &s.id == id).cloned()
    }

    pub fn contains(&self, id: &SuggestionId) -> bool {
        self.contents().items.iter().any(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.contents().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents().items.is_empty()
    }

    /// Snapshot in feed order.
    pub fn snapshot(&self) -> Vec<Suggestion> {
        self.contents().items.clone()
    }

    /// Snapshot in the requested order. Sorting is stable, so ties keep
    /// feed order.
    pub fn sorted(&self, order: SortOrder) -> Vec<Suggestion> {
        let mut items = self.snapshot();
        match order {
            SortOrder::Feed => {}
            SortOrder::Top => items.sort_by(|a, b| b.vote_count.cmp(&a.vote_count)),
            SortOrder::New => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        items
    }

    /// Revision counter, bumped on every write.
    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    /// Change notifications for re-rendering.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    // ── Writes ─────────────────────────────────────────────────────────

    /// Current vote epoch. Capture it before requesting a listing and pass
    /// it to [`apply_listing`](Self::apply_listing).
    pub(crate) fn vote_epoch(&self) -> u64 {
        self.contents().vote_epoch
    }

    /// Replace the contents with a fresh server listing, discarding all
    /// local vote state.
    pub(crate) fn replace_all(&self, fresh: Vec<Suggestion>) {
        let since = self.vote_epoch();
        self.apply_listing(fresh, since, &HashSet::new());
    }

    /// Replace the contents with a server listing requested at vote epoch
    /// `since`.
    ///
    /// An entry keeps its local vote state if its id is in `pending` (an
    /// unconfirmed vote) or if it was voted on after `since`.
    pub(crate) fn apply_listing(
        &self,
        fresh: Vec<Suggestion>,
        since: u64,
        pending: &HashSet<SuggestionId>,
    ) {
        {
            let mut contents = self.contents();
            let mut fresh = fresh;
            for s in fresh.iter_mut() {
                let voted_since = contents.voted_at.get(&s.id).is_some_and(|at| *at > since);
                if !voted_since && !pending.contains(&s.id) {
                    continue;
                }
                if let Some(local) = contents.items.iter().find(|l| l.id == s.id) {
                    s.apply(local.committed_state());
                }
            }
            contents.items = fresh;
        }
        self.bump();
    }

    /// Put a suggestion at the head of the feed, replacing any entry with the
    /// same id.
    pub(crate) fn insert_front(&self, suggestion: Suggestion) {
        {
            let mut contents = self.contents();
            let items = &mut contents.items;
            items.retain(|s| s.id != suggestion.id);
            items.insert(0, suggestion);
        }
        self.bump();
    }

    /// Append a suggestion the feed has not loaded yet. No-op if the id is
    /// already present.
    pub(crate) fn insert_missing(&self, suggestion: Suggestion) -> bool {
        {
            let mut contents = self.contents();
            let items = &mut contents.items;
            if items.iter().any(|s| s.id == suggestion.id) {
                return false;
            }
            items.push(suggestion);
        }
        self.bump();
        true
    }

    /// Overwrite the vote fields of one suggestion and stamp it with a new
    /// vote epoch. Returns the previous state, or `None` if the id is unknown.
    pub(crate) fn set_vote_state(
        &self,
        id: &SuggestionId,
        state: CommittedState,
    ) -> Option<CommittedState> {
        let previous = {
            let mut contents = self.contents();
            let entry = contents.items.iter_mut().find(|s| &s.id == id)?;
            let previous = entry.committed_state();
            entry.apply(state);
            contents.vote_epoch += 1;
            let epoch = contents.vote_epoch;
            contents.voted_at.insert(id.clone(), epoch);
            previous
        };
        self.bump();
        Some(previous)
    }
}

impl Default for SuggestionStore {
    fn default() -> Self {
        Self::new()
    }
}
