use std::fmt;

use thiserror::Error;

/// High-level error type shared across draftpub components.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish precondition failed: {0}")]
    PublishPrecondition(String),
    #[error("unpublish precondition failed: {0}")]
    UnpublishPrecondition(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PublishError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl PublishError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            PublishError::PublishPrecondition(msg) => {
                PublishError::PublishPrecondition(format!("{ctx}: {msg}"))
            }
            PublishError::UnpublishPrecondition(msg) => {
                PublishError::UnpublishPrecondition(format!("{ctx}: {msg}"))
            }
            PublishError::PermissionDenied(msg) => {
                PublishError::PermissionDenied(format!("{ctx}: {msg}"))
            }
            PublishError::UnknownModel(model) => PublishError::UnknownModel(model),
            PublishError::Schema(msg) => PublishError::Schema(format!("{ctx}: {msg}")),
            PublishError::Storage(msg) => PublishError::Storage(format!("{ctx}: {msg}")),
            PublishError::Workspace(msg) => PublishError::Workspace(format!("{ctx}: {msg}")),
            PublishError::Serialization(msg) => {
                PublishError::Serialization(format!("{ctx}: {msg}"))
            }
            PublishError::Io(err) => PublishError::Io(err),
        }
    }

    /// True for failures caused by calling an operation on a record in the wrong state.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PublishError::PublishPrecondition(_) | PublishError::UnpublishPrecondition(_)
        )
    }
}
