//! Vote state, vote kinds and the canonical vote tally.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypesError;

/// The current user's vote on a suggestion.
///
/// Toggle-mode backends only ever report `None` or `Upvoted`; the boolean
/// `has_voted` view of either mode is [`VoteState::has_voted`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    #[default]
    None,
    Upvoted,
    Downvoted,
}

impl VoteState {
    pub fn from_has_voted(has_voted: bool) -> Self {
        if has_voted {
            Self::Upvoted
        } else {
            Self::None
        }
    }

    pub fn has_voted(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Contribution of this state to the suggestion's tally.
    pub fn weight(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Upvoted => 1,
            Self::Downvoted => -1,
        }
    }

    /// Parse the backend's `vote_type` string.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        match raw.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "upvote" | "upvoted" | "up" => Ok(Self::Upvoted),
            "downvote" | "downvoted" | "down" => Ok(Self::Downvoted),
            other => Err(TypesError::UnknownVoteState(other.to_string())),
        }
    }
}

/// A vote action requested by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    /// Directional up vote; re-issuing it removes the vote.
    Upvote,
    /// Directional down vote; re-issuing it removes the vote.
    Downvote,
    /// Toggle: vote if not voted, remove the vote otherwise.
    Vote,
    /// Remove whatever vote is present.
    Unvote,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
            Self::Vote => "vote",
            Self::Unvote => "unvote",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which voting contract the backend exposes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingMode {
    /// Single vote endpoint flipping a boolean `has_voted`.
    #[default]
    Toggle,
    /// Up/down voting with a signed tally.
    Directional,
}

impl VotingMode {
    /// Whether `kind` is a valid action under this mode.
    pub fn accepts(&self, kind: VoteKind) -> bool {
        match self {
            Self::Toggle => matches!(kind, VoteKind::Vote | VoteKind::Unvote),
            Self::Directional => {
                matches!(kind, VoteKind::Upvote | VoteKind::Downvote | VoteKind::Unvote)
            }
        }
    }

    /// The kind used to add a vote to an existing suggestion.
    pub fn affirmative(&self) -> VoteKind {
        match self {
            Self::Toggle => VoteKind::Vote,
            Self::Directional => VoteKind::Upvote,
        }
    }
}

/// `{vote_count, vote_state}` pair, either the local guess or the server's
/// canonical answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommittedState {
    pub vote_count: u32,
    pub vote_state: VoteState,
}

impl CommittedState {
    pub fn new(vote_count: u32, vote_state: VoteState) -> Self {
        Self {
            vote_count,
            vote_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_signed() {
        assert_eq!(VoteState::Upvoted.weight() - VoteState::Downvoted.weight(), 2);
        assert_eq!(VoteState::None.weight(), 0);
    }

    #[test]
    fn toggle_mode_rejects_directional_kinds() {
        assert!(VotingMode::Toggle.accepts(VoteKind::Vote));
        assert!(VotingMode::Toggle.accepts(VoteKind::Unvote));
        assert!(!VotingMode::Toggle.accepts(VoteKind::Upvote));
        assert!(!VotingMode::Directional.accepts(VoteKind::Vote));
        assert!(VotingMode::Directional.accepts(VoteKind::Downvote));
    }

    #[test]
    fn parse_vote_type_strings() {
        assert_eq!(VoteState::parse("upvote").unwrap(), VoteState::Upvoted);
        assert_eq!(VoteState::parse("DOWNVOTE").unwrap(), VoteState::Downvoted);
        assert_eq!(VoteState::parse("").unwrap(), VoteState::None);
        assert!(VoteState::parse("sideways").is_err());
    }
}
