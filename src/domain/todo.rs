use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a todo item. Stored as a string on the wire; generated ids
/// are the decimal form of a monotonic counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TodoId(pub String);

impl TodoId {
    pub fn from_counter(n: u64) -> Self { Self(n.to_string()) }

    /// Numeric value of the id, if it was produced by the counter.
    pub fn counter_value(&self) -> Option<u64> { self.0.parse().ok() }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for TodoId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority {
    #[serde(rename = "1")]
    High,
    #[serde(rename = "2")]
    Moderate,
    #[default]
    #[serde(rename = "3")]
    Low,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self { Priority::High => "High", Priority::Moderate => "Moderate", Priority::Low => "Low" }
    }

    /// Next value in picker order (Low -> Moderate -> High -> Low).
    pub fn cycle(self) -> Self {
        match self { Priority::Low => Priority::Moderate, Priority::Moderate => Priority::High, Priority::High => Priority::Low }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoItem {
    pub id: TodoId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
}

/// User-supplied fields for create and edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

impl TodoDraft {
    pub fn new(title: impl Into<String>) -> Self { Self { title: title.into(), ..Self::default() } }

    pub fn description(mut self, description: impl Into<String>) -> Self { self.description = description.into(); self }

    pub fn priority(mut self, priority: Priority) -> Self { self.priority = priority; self }
}

impl From<&TodoItem> for TodoDraft {
    fn from(item: &TodoItem) -> Self {
        Self { title: item.title.clone(), description: item.description.clone(), priority: item.priority }
    }
}
