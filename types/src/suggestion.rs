//! Suggestion records and drafts.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypesError;
use crate::id::SuggestionId;
use crate::vote::{CommittedState, VoteState};

/// Longest title the backend stores.
pub const MAX_TITLE_LEN: usize = 200;

/// Review status of a suggestion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Implemented,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Implemented => "implemented",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "implemented" => Ok(Self::Implemented),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }

    /// Whether the suggestion is closed to further review.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Rejected | Self::Implemented)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An improvement suggestion as known to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub title: String,
    pub description: Option<String>,
    pub vote_count: u32,
    pub vote_state: VoteState,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    /// Opaque handle of the submitting member.
    pub author: String,
}

impl Suggestion {
    /// Title and description joined the way the backend embeds them.
    pub fn text(&self) -> String {
        match self.description.as_deref() {
            Some(desc) if !desc.trim().is_empty() => format!("{} {}", self.title, desc),
            _ => self.title.clone(),
        }
    }

    pub fn committed_state(&self) -> CommittedState {
        CommittedState::new(self.vote_count, self.vote_state)
    }

    pub fn apply(&mut self, state: CommittedState) {
        self.vote_count = state.vote_count;
        self.vote_state = state.vote_state;
    }
}

/// A suggestion being written, before it exists on the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSuggestion {
    pub title: String,
    pub description: Option<String>,
}

impl DraftSuggestion {
    pub fn new(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            title: title.into(),
            description,
        }
    }

    /// Check the draft locally before anything is sent.
    pub fn validate(&self) -> Result<(), TypesError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TypesError::EmptyTitle);
        }
        let len = title.chars().count();
        if len > MAX_TITLE_LEN {
            return Err(TypesError::TitleTooLong {
                len,
                max: MAX_TITLE_LEN,
            });
        }
        Ok(())
    }

    /// Trimmed copy with an empty description collapsed to `None`.
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self
                .description
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
    }
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339 as well as the `YYYY-MM-DD HH:MM:SS[.ffffff]+HH:MM`
/// form produced by stringifying a timezone-aware datetime. Naive values are
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TypesError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| TypesError::InvalidTimestamp(raw.to_string()))
}
