use thiserror::Error;
use votebox_client::ServiceError;
use votebox_types::{SuggestionId, TypesError};

/// Errors surfaced to the presentation layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),

    /// Refused locally before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another operation on the same key is still in flight.
    #[error("busy: {0}")]
    Busy(String),

    #[error("session is not authorized")]
    Unauthorized,

    #[error("server rejected request ({status}): {detail}")]
    ServerRejected { status: u16, detail: String },

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    #[error("suggestion not found: {0}")]
    NotFound(SuggestionId),

    #[error("{intent} is not allowed while {state}")]
    InvalidState {
        intent: &'static str,
        state: &'static str,
    },
}

impl ClientError {
    /// Whether the refusal happened locally with no network call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Busy(_) | Self::NotFound(_) | Self::InvalidState { .. }
        )
    }

    /// Short message suitable for a transient notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Could not reach the server. Please try again.".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::Busy(_) => "Please wait for the previous action to finish.".to_string(),
            Self::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            Self::ServerRejected { detail, .. } if !detail.is_empty() => detail.clone(),
            Self::ServerRejected { .. } | Self::InvalidResponse(_) => {
                "The server could not complete the request.".to_string()
            }
            Self::NotFound(_) => "That suggestion no longer exists.".to_string(),
            Self::InvalidState { .. } => "That action is not available right now.".to_string(),
        }
    }
}

impl From<ServiceError> for ClientError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Network(msg) => Self::Network(msg),
            ServiceError::Unauthorized => Self::Unauthorized,
            ServiceError::Rejected { status, detail } => Self::ServerRejected { status, detail },
            ServiceError::InvalidResponse(msg) => Self::InvalidResponse(msg),
            ServiceError::InvalidRequest(msg) => Self::Validation(msg),
        }
    }
}

impl From<TypesError> for ClientError {
    fn from(e: TypesError) -> Self {
        Self::Validation(e.to_string())
    }
}
