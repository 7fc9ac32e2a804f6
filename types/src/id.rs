//! Opaque suggestion identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the backend assigns to a suggestion.
///
/// The client never interprets the contents; the backend currently hands out
/// UUID strings but any non-empty string is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionId(String);

impl SuggestionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Return the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier can be used as a single request path segment.
    ///
    /// Dot segments and characters that would end the path or be decoded by
    /// the server (`/ \ ? # %`, whitespace, control characters) are refused.
    pub fn is_valid(&self) -> bool {
        let raw = self.0.as_str();
        !raw.is_empty()
            && raw != "."
            && raw != ".."
            && !raw.chars().any(|c| {
                matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
            })
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SuggestionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SuggestionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
