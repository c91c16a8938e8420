//! The todo list state machine.
//!
//! [`TodoStore`] owns the ordered list of items and is the only mutator.
//! Every mutation writes the whole list back to the key-value slot
//! [`TODOS_KEY`] before returning, so writes land in the order the
//! mutations were issued.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::domain::repository::KeyValueStore;
use crate::domain::todo::{TodoDraft, TodoId, TodoItem};
use crate::error::{StorageError, TodoError};

pub const TODOS_KEY: &str = "todos";
pub const NEXT_ID_KEY: &str = "todos_next_id";

/// How failed writes are retried. The wait before retry `n` is `backoff * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self { Self { retries: 1, backoff: Duration::from_millis(200) } }
}

impl WritePolicy {
    pub fn delay_before(&self, attempt: u32) -> Duration { self.backoff.saturating_mul(attempt) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp { Load, Save }

/// A persistence failure the rendering surface should show without blocking
/// the user. The in-memory list is still authoritative when one is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWarning {
    pub op: StorageOp,
    pub error: StorageError,
}

impl fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            StorageOp::Load => write!(f, "could not load saved todos: {}", self.error),
            StorageOp::Save => write!(f, "changes are not saved: {}", self.error),
        }
    }
}

pub struct TodoStore<S: KeyValueStore> {
    storage: S,
    policy: WritePolicy,
    items: Vec<TodoItem>,
    next_id: u64,
    // Set while the persisted counter may lag behind `next_id`.
    counter_dirty: bool,
    warning: Option<StorageWarning>,
    last_saved_at: Option<DateTime<Utc>>,
}

impl<S: KeyValueStore> TodoStore<S> {
    /// Builds a store and loads whatever is persisted. Mutations are only
    /// reachable through the returned value, so they always follow the load.
    pub async fn open(storage: S, policy: WritePolicy) -> Self {
        let mut store = Self { storage, policy, items: Vec::new(), next_id: 1, counter_dirty: false, warning: None, last_saved_at: None };
        store.load().await;
        info!(count = store.items.len(), next_id = store.next_id, "todo store opened");
        store
    }

    /// Re-reads the persisted list. On failure the current list is kept.
    pub async fn load(&mut self) -> &[TodoItem] {
        match self.read_items().await {
            Ok(items) => self.items = items.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "failed to load todos");
                self.warning = Some(StorageWarning { op: StorageOp::Load, error: e });
            }
        }
        let stored_next = self.read_next_id().await;
        let after_max = self.items.iter().filter_map(|i| i.id.counter_value()).max().map_or(1, |m| m.saturating_add(1));
        self.next_id = self.next_id.max(stored_next.unwrap_or(1)).max(after_max);
        if stored_next != Some(self.next_id) { self.counter_dirty = true; }
        &self.items
    }

    pub async fn create(&mut self, draft: TodoDraft) -> Result<TodoId, TodoError> {
        if draft.title.is_empty() {
            debug!("rejecting todo with empty title");
            return Err(TodoError::EmptyTitle);
        }
        // u64::MAX is never handed out; a counter that reaches it is exhausted.
        let following = self.next_id.checked_add(1).ok_or(TodoError::IdsExhausted)?;
        let id = TodoId::from_counter(self.next_id);
        self.next_id = following;
        self.counter_dirty = true;
        self.items.push(TodoItem {
            id: id.clone(),
            title: draft.title,
            description: draft.description,
            completed: false,
            priority: draft.priority,
        });
        self.write_through().await;
        Ok(id)
    }

    /// Replaces title, description and priority; `id` and `completed` are kept.
    pub async fn edit(&mut self, id: &TodoId, draft: TodoDraft) -> Result<(), TodoError> {
        if draft.title.is_empty() {
            return Err(TodoError::EmptyTitle);
        }
        let item = self.item_mut(id)?;
        item.title = draft.title;
        item.description = draft.description;
        item.priority = draft.priority;
        self.write_through().await;
        Ok(())
    }

    /// Flips `completed` and returns the new value.
    pub async fn toggle_complete(&mut self, id: &TodoId) -> Result<bool, TodoError> {
        let item = self.item_mut(id)?;
        item.completed = !item.completed;
        let completed = item.completed;
        self.write_through().await;
        Ok(completed)
    }

    pub async fn delete(&mut self, id: &TodoId) -> Result<(), TodoError> {
        let before = self.items.len();
        self.items.retain(|i| &i.id != id);
        if self.items.len() == before {
            return Err(TodoError::NotFound(id.clone()));
        }
        self.write_through().await;
        Ok(())
    }

    pub fn find(&self, id: &TodoId) -> Option<&TodoItem> { self.items.iter().find(|i| &i.id == id) }

    pub fn items(&self) -> &[TodoItem] { &self.items }

    pub fn take_warning(&mut self) -> Option<StorageWarning> { self.warning.take() }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> { self.last_saved_at }

    fn item_mut(&mut self, id: &TodoId) -> Result<&mut TodoItem, TodoError> {
        self.items.iter_mut().find(|i| &i.id == id).ok_or_else(|| TodoError::NotFound(id.clone()))
    }

    async fn read_items(&self) -> Result<Option<Vec<TodoItem>>, StorageError> {
        let Some(raw) = self.storage.get(TODOS_KEY).await? else { return Ok(None) };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Malformed { key: TODOS_KEY.to_string(), message: e.to_string() })
    }

    async fn read_next_id(&self) -> Option<u64> {
        match self.storage.get(NEXT_ID_KEY).await {
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(n) => Some(n),
                Err(_) => { warn!(value = %raw, "ignoring malformed id counter"); None }
            },
            Ok(None) => None,
            Err(e) => { warn!(error = %e, "failed to read id counter"); None }
        }
    }

    async fn write_through(&mut self) {
        let result = match serde_json::to_string(&self.items) {
            Ok(snapshot) => self.persist(&snapshot).await,
            Err(e) => Err(StorageError::Serialization(e.to_string())),
        };
        match result {
            Ok(()) => {
                debug!(count = self.items.len(), "todos saved");
                self.counter_dirty = false;
                self.last_saved_at = Some(Utc::now());
            }
            Err(e) => {
                error!(error = %e, "giving up on saving todos");
                self.warning = Some(StorageWarning { op: StorageOp::Save, error: e });
            }
        }
    }

    async fn persist(&self, snapshot: &str) -> Result<(), StorageError> {
        self.set_with_retry(TODOS_KEY, snapshot).await?;
        if self.counter_dirty {
            self.set_with_retry(NEXT_ID_KEY, &self.next_id.to_string()).await?;
        }
        Ok(())
    }

    async fn set_with_retry(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            match self.storage.set(key, value).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.policy.retries => {
                    attempt += 1;
                    let delay = self.policy.delay_before(attempt);
                    warn!(key, attempt, ?delay, error = %e, "write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
