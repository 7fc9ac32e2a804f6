//! Similarity matches returned by the backend's near-duplicate search.

use serde::{Deserialize, Serialize};

use crate::id::SuggestionId;

/// An existing suggestion judged close to some typed text.
///
/// Matches are snapshots: the text and vote count are what the backend saw
/// when it answered, not live store state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub suggestion_id: SuggestionId,
    pub snapshot_text: String,
    pub snapshot_vote_count: u32,
    /// Closeness in `[0, 1]`.
    pub score: f64,
}

impl SimilarityMatch {
    /// Build a match, clamping the score into `[0, 1]` (NaN becomes 0).
    pub fn new(
        suggestion_id: SuggestionId,
        snapshot_text: impl Into<String>,
        snapshot_vote_count: u32,
        score: f64,
    ) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            suggestion_id,
            snapshot_text: snapshot_text.into(),
            snapshot_vote_count,
            score,
        }
    }

    /// Score as a whole percentage, for display.
    pub fn percent(&self) -> u8 {
        (self.score * 100.0).round() as u8
    }
}

/// Outcome of a pre-submit duplicate check.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub duplicate_found: bool,
    /// Ranked best match first.
    pub matches: Vec<SimilarityMatch>,
    /// Human-readable hint from the service, if any.
    pub message: Option<String>,
}

impl DuplicateCheck {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn top(&self) -> Option<&SimilarityMatch> {
        self.matches.first()
    }

    /// Whether the draft should be routed to the decision step.
    ///
    /// The service owns the threshold; any reported match counts.
    pub fn has_duplicates(&self) -> bool {
        self.duplicate_found && !self.matches.is_empty()
    }
}
