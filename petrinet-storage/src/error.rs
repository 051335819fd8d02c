//! Storage error types.

use petrinet_core::CoreError;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("invalid instance id: {0:?}")]
    InvalidInstanceId(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("timed out waiting for lock: {0}")]
    LockTimeout(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InstanceNotFound(instance_id) => {
                CoreError::InstanceNotFound { instance_id }
            }
            other => CoreError::Persistence {
                reason: other.to_string(),
            },
        }
    }
}
