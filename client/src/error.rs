use thiserror::Error;

/// Failures reported by a [`SuggestionService`](crate::SuggestionService)
/// implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Transport or connectivity failure; the request may or may not have
    /// reached the server.
    #[error("network error: {0}")]
    Network(String),

    /// The session token was missing, expired or refused.
    #[error("unauthorized")]
    Unauthorized,

    /// The server answered with a 4xx/5xx status.
    #[error("server rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The server answered 2xx but the body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be built from the given input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Map a non-success HTTP status and its body to an error.
    ///
    /// FastAPI-style `{"detail": ...}` bodies are unwrapped; anything else is
    /// kept verbatim (truncated).
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return Self::Unauthorized;
        }
        Self::Rejected {
            status,
            detail: extract_detail(body),
        }
    }
}

const MAX_DETAIL_LEN: usize = 200;

fn extract_detail(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.trim().to_string());
    if detail.chars().count() > MAX_DETAIL_LEN {
        detail.chars().take(MAX_DETAIL_LEN).collect::<String>() + "…"
    } else {
        detail
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Network(format!("request timed out: {e}"))
        } else if e.is_connect() {
            ServiceError::Network(format!("connection failed: {e}"))
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else if e.is_builder() {
            ServiceError::InvalidRequest(e.to_string())
        } else {
            ServiceError::Network(e.to_string())
        }
    }
}
