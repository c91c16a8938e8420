use thiserror::Error;

use crate::domain::todo::TodoId;

/// Rejections from store operations. The store state is unchanged whenever
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("no todo with id {0}")]
    NotFound(TodoId),
    #[error("no more ids can be assigned")]
    IdsExhausted,
}

/// Failures reported by a key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage backend failed: {0}")]
    Backend(String),
    #[error("stored value for {key:?} is malformed: {message}")]
    Malformed { key: String, message: String },
    #[error("failed to serialize todos: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self { StorageError::Backend(e.to_string()) }
}
