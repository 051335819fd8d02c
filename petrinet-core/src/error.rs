//! Core error types.

use thiserror::Error;

/// Errors from the Petri net engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot fire transition: {transition}")]
    Unfireable { transition: String },

    #[error("unknown transition: {transition}")]
    UnknownTransition { transition: String },

    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("state space is empty")]
    EmptyStateSpace,

    #[error("state space exceeds {limit} markings")]
    StateSpaceTooLarge { limit: usize },

    #[error("token count overflow in place '{place}'")]
    TokenOverflow { place: String },

    #[error("weighted token sum overflows at place '{place}'")]
    InvariantOverflow { place: String },

    #[error("marking covers {actual} places, expected {expected}")]
    MarkingMismatch { expected: usize, actual: usize },

    #[error("unknown place: {place}")]
    UnknownPlace { place: String },

    #[error("marking has no token count for place '{place}'")]
    IncompleteMarking { place: String },

    #[error("invalid net definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Persistence { .. })
    }

    /// Returns a stable error code suitable for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Unfireable { .. } => "UNFIREABLE",
            CoreError::UnknownTransition { .. } => "UNKNOWN_TRANSITION",
            CoreError::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            CoreError::EmptyStateSpace => "EMPTY_STATE_SPACE",
            CoreError::StateSpaceTooLarge { .. } => "STATE_SPACE_TOO_LARGE",
            CoreError::TokenOverflow { .. } => "TOKEN_OVERFLOW",
            CoreError::InvariantOverflow { .. } => "INVARIANT_OVERFLOW",
            CoreError::MarkingMismatch { .. } => "BAD_REQUEST",
            CoreError::UnknownPlace { .. } => "BAD_REQUEST",
            CoreError::IncompleteMarking { .. } => "BAD_REQUEST",
            CoreError::InvalidDefinition { .. } => "BAD_REQUEST",
            CoreError::Persistence { .. } => "PERSISTENCE_ERROR",
            CoreError::Json(_) => "BAD_REQUEST",
            CoreError::Yaml(_) => "BAD_REQUEST",
        }
    }
}
