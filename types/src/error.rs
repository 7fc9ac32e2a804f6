//! Errors raised while building domain values from untrusted input.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("unknown suggestion status: {0}")]
    UnknownStatus(String),

    #[error("unknown vote state: {0}")]
    UnknownVoteState(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title is too long: {len} characters, max {max}")]
    TitleTooLong { len: usize, max: usize },
}
