use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::message::StoredMessage;

pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    #[serde(rename = "threadId")]
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    #[serde(rename = "threadId")]
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Local>,
}

impl Thread {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: Local::now(),
            messages: Vec::new(),
        }
    }

    /// Thread created implicitly by the first write against an unknown id.
    pub fn lazy(id: impl Into<String>) -> Self {
        Self::new(id, DEFAULT_THREAD_TITLE)
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
        }
    }
}
