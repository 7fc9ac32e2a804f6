//! The vote transition function shared by both voting modes.

use votebox_types::{CommittedState, VoteKind, VoteState, VotingMode};

use crate::error::ClientError;

/// Compute the optimistic state after applying `kind` to `current`.
///
/// Re-issuing the kind that produced the current state removes the vote;
/// switching direction moves the tally by 2. The count never goes below 0.
pub fn transition(
    mode: VotingMode,
    current: CommittedState,
    kind: VoteKind,
) -> Result<CommittedState, ClientError> {
    if !mode.accepts(kind) {
        return Err(ClientError::Validation(format!(
            "{kind} is not available in {mode:?} voting mode"
        )));
    }

    let next = match (kind, current.vote_state) {
        (VoteKind::Unvote, VoteState::None) => {
            return Err(ClientError::Validation(
                "there is no vote to remove".to_string(),
            ));
        }
        (VoteKind::Unvote, _) => VoteState::None,
        (VoteKind::Vote, VoteState::None) => VoteState::Upvoted,
        (VoteKind::Vote, _) => VoteState::None,
        (VoteKind::Upvote, VoteState::Upvoted) => VoteState::None,
        (VoteKind::Upvote, _) => VoteState::Upvoted,
        (VoteKind::Downvote, VoteState::Downvoted) => VoteState::None,
        (VoteKind::Downvote, _) => VoteState::Downvoted,
    };

    let delta = next.weight() - current.vote_state.weight();
    let count = (i64::from(current.vote_count) + delta).clamp(0, i64::from(u32::MAX)) as u32;
    Ok(CommittedState::new(count, next))
}
