//! Failure taxonomy surfaced by every tracking and scoring operation.

use serde::{Deserialize, Serialize};

use crate::db::models::SessionRejection;

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("page session {0} has already ended")]
    AlreadyEnded(String),
    /// The store failed or did not answer in time. Safe to retry.
    #[error("storage unavailable: {0:#}")]
    UpstreamUnavailable(#[from] anyhow::Error),
}

impl TrackingError {
    pub fn validation(message: impl Into<String>) -> Self {
        TrackingError::Validation(message.into())
    }

    pub fn page_session_not_found(session_id: &str) -> Self {
        TrackingError::NotFound(format!("page session {session_id}"))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackingError::UpstreamUnavailable(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackingError::NotFound(_) => ErrorKind::NotFound,
            TrackingError::Forbidden(_) => ErrorKind::Forbidden,
            TrackingError::Unauthorized(_) => ErrorKind::Unauthorized,
            TrackingError::Validation(_) => ErrorKind::Validation,
            TrackingError::AlreadyEnded(_) => ErrorKind::AlreadyEnded,
            TrackingError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Maps a store-level refusal on `session_id` to the caller-facing error.
    /// Writes against an ended session report the session as not found.
    pub fn from_rejection(rejection: SessionRejection, session_id: &str) -> Self {
        match rejection {
            SessionRejection::Missing | SessionRejection::Ended => {
                TrackingError::page_session_not_found(session_id)
            }
            SessionRejection::TokenMismatch => TrackingError::Forbidden(
                "page session does not belong to this client".to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Unauthorized,
    Validation,
    AlreadyEnded,
    UpstreamUnavailable,
}

/// Serializable error returned by the command layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<TrackingError> for CommandError {
    fn from(err: TrackingError) -> Self {
        Self {
            kind: err.kind(),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_failures_are_retryable() {
        let store = TrackingError::from(anyhow::anyhow!("database call timed out after 10 ms"));
        assert!(store.is_retryable());
        assert!(!TrackingError::validation("bad").is_retryable());

        let command = CommandError::from(store);
        assert_eq!(command.kind, ErrorKind::UpstreamUnavailable);
        assert!(command.message.contains("timed out"));
    }

    #[test]
    fn rejections_map_to_caller_errors() {
        assert_eq!(
            TrackingError::from_rejection(SessionRejection::Ended, "ps").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            TrackingError::from_rejection(SessionRejection::TokenMismatch, "ps").kind(),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::UpstreamUnavailable).unwrap(),
            "\"upstream_unavailable\""
        );
    }
}
