pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::todo_store::{StorageOp, StorageWarning, TodoStore, WritePolicy};
pub use domain::todo::{Priority, TodoDraft, TodoId, TodoItem};
pub use error::{StorageError, TodoError};
