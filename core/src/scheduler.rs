//! Debounced similarity query scheduler.
//!
//! Turns a stream of text-input events into at most one similarity query per
//! quiet interval and publishes only the freshest answer.
//!
//! Two counters guard freshness:
//! - `generation` bumps on every input change. A debounce timer that wakes up
//!   under an older generation does nothing (the task is also aborted, the
//!   check covers the window where it already woke).
//! - `issued` bumps every time a query is sent or the input is cleared. A
//!   response is published only if its sequence number still equals `issued`.
//!
//! All publishes happen while holding the state lock, so the freshness check
//! and the view update cannot interleave with another input event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use votebox_client::{SessionStore, SuggestionService};
use votebox_types::SimilarityMatch;

use crate::config::CoreConfig;
use crate::error::ClientError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityStatus {
    #[default]
    Idle,
    Checking,
    Results,
    NoMatches,
}

/// What the presentation shows under the input field.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimilarityView {
    pub status: SimilarityStatus,
    pub matches: Vec<SimilarityMatch>,
    /// Transient notice from the last failed query.
    pub error: Option<String>,
    /// The text the current matches (or pending check) belong to.
    pub query: Option<String>,
    /// Sequence number of the query this view belongs to.
    pub sequence: u64,
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    issued: u64,
    timer: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    service: Arc<dyn SuggestionService>,
    session: Arc<dyn SessionStore>,
    config: CoreConfig,
    state: Mutex<SchedulerState>,
    view: watch::Sender<SimilarityView>,
}

impl SchedulerInner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SimilarityScheduler {
    inner: Arc<SchedulerInner>,
}

impl SimilarityScheduler {
    pub fn new(
        service: Arc<dyn SuggestionService>,
        session: Arc<dyn SessionStore>,
        config: CoreConfig,
    ) -> Self {
        let (view, _) = watch::channel(SimilarityView::default());
        Self {
            inner: Arc::new(SchedulerInner {
                service,
                session,
                config,
                state: Mutex::new(SchedulerState::default()),
                view,
            }),
        }
    }

    pub fn view(&self) -> SimilarityView {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SimilarityView> {
        self.inner.view.subscribe()
    }

    /// Feed the current contents of the input field.
    ///
    /// Must be called from within a tokio runtime: the debounce timer is a
    /// spawned task.
    pub fn on_input_change(&self, text: &str) {
        let query = text.trim().to_string();
        let mut state = self.inner.state();
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        if query.chars().count() < self.inner.config.min_query_len {
            state.issued += 1;
            let sequence = state.issued;
            self.inner.view.send_replace(SimilarityView {
                sequence,
                ..SimilarityView::default()
            });
            return;
        }

        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.config.debounce()).await;
            run_query(inner, generation, query).await;
        }));
    }

    /// Drop any pending timer and results.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        state.generation += 1;
        state.issued += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let sequence = state.issued;
        self.inner.view.send_replace(SimilarityView {
            sequence,
            ..SimilarityView::default()
        });
    }
}

impl Drop for SimilarityScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.state().timer.take() {
            timer.abort();
        }
    }
}

async fn run_query(inner: Arc<SchedulerInner>, generation: u64, query: String) {
    let sequence = {
        let mut state = inner.state();
        if state.generation != generation {
            return;
        }
        // The query leaves now; later input may no longer abort this task.
        state.timer = None;
        state.issued += 1;
        let sequence = state.issued;
        // Matches for older text never sit under the new query.
        inner.view.send_replace(SimilarityView {
            status: SimilarityStatus::Checking,
            matches: Vec::new(),
            error: None,
            query: Some(query.clone()),
            sequence,
        });
        sequence
    };

    debug!(sequence, query = %query, "similarity query issued");
    let result = inner
        .service
        .similar(&query, inner.config.similarity_limit)
        .await
        .map_err(ClientError::from);

    let state = inner.state();
    if state.issued != sequence {
        debug!(
            sequence,
            latest = state.issued,
            "discarding stale similarity response"
        );
        return;
    }

    match result {
        Ok(matches) => {
            let status = if matches.is_empty() {
                SimilarityStatus::NoMatches
            } else {
                SimilarityStatus::Results
            };
            inner.view.send_replace(SimilarityView {
                status,
                matches,
                error: None,
                query: Some(query),
                sequence,
            });
        }
        Err(err) => {
            warn!(sequence, error = %err, "similarity query failed");
            if err == ClientError::Unauthorized {
                inner.session.on_unauthorized();
            }
            inner.view.send_replace(SimilarityView {
                status: SimilarityStatus::Idle,
                matches: Vec::new(),
                error: Some(err.user_message()),
                query: Some(query),
                sequence,
            });
        }
    }
}
