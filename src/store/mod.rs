//! Conversation history per thread.
//!
//! Stores keep the full record, tool traffic included. `get_messages`
//! returns what the model sees; [`user_visible`] is what end users see.

mod filesystem;
mod locks;
mod memory;

use async_trait::async_trait;

pub use filesystem::FilesystemThreadStore;
pub use locks::{FileLock, ThreadGuard, ThreadLocks};
pub use memory::InMemoryThreadStore;

use crate::error::Result;
use crate::models::{Message, Role, StoredMessage, Thread, ThreadSummary};

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create_thread(&self, title: &str) -> Result<ThreadSummary>;

    /// All threads, newest first.
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>>;

    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Rename a thread.
    async fn update_thread(&self, thread_id: &str, title: &str) -> Result<ThreadSummary>;

    /// Model-visible history. Unknown threads have none.
    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>>;

    /// Stored records with their ids.
    async fn get_all_messages(&self, thread_id: &str) -> Result<Vec<StoredMessage>>;

    /// Append to the thread, creating it as "New Chat" if unknown.
    async fn append_message(&self, thread_id: &str, message: StoredMessage) -> Result<()>;

    /// Replace the message carrying the same id. Returns `false` (and
    /// changes nothing) when no message has that id.
    async fn update_message(&self, thread_id: &str, message: StoredMessage) -> Result<bool>;

    /// Make the first message the given system prompt and drop any other
    /// system messages.
    async fn ensure_system_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Exclusive request lock for one thread. Held by a chat request from
    /// start to finish so two requests never interleave their messages.
    async fn lock_thread(&self, thread_id: &str) -> Result<ThreadGuard>;
}

/// End-user projection: tool results and tool-request-only assistant
/// messages are dropped.
pub fn user_visible(messages: Vec<StoredMessage>) -> Vec<StoredMessage> {
    messages
        .into_iter()
        .filter(|m| m.message.is_user_visible())
        .collect()
}

pub(crate) fn replace_by_id(thread: &mut Thread, message: StoredMessage) -> bool {
    let Some(id) = message.id.as_deref() else {
        return false;
    };
    match thread
        .messages
        .iter_mut()
        .find(|m| m.id.as_deref() == Some(id))
    {
        Some(slot) => {
            *slot = message;
            true
        }
        None => false,
    }
}

pub(crate) fn install_system_message(thread: &mut Thread, content: &str) {
    thread.messages.retain(|m| m.message.role != Role::System);
    thread
        .messages
        .insert(0, StoredMessage::anonymous(Message::system(content)));
}

pub(crate) fn newest_first(mut summaries: Vec<ThreadSummary>) -> Vec<ThreadSummary> {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_hides_tool_traffic() {
        let messages = vec![
            StoredMessage::anonymous(Message::system("sys")),
            StoredMessage::new("p1", Message::user("weather?")),
            StoredMessage::new(
                "t1",
                Message::tool_request(vec![crate::models::ToolCall::function("c1", "web_search", "{}")]),
            ),
            StoredMessage::new("t2", Message::tool_result("c1", "[]")),
            StoredMessage::new("r1", Message::assistant("Sunny.")),
        ];

        let ids: Vec<_> = user_visible(messages)
            .into_iter()
            .filter_map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["p1", "r1"]);
    }

    #[test]
    fn system_message_is_unique_and_first() {
        let mut thread = Thread::lazy("t");
        thread.messages.push(StoredMessage::new("u", Message::user("hi")));
        thread.messages.push(StoredMessage::anonymous(Message::system("stray")));

        install_system_message(&mut thread, "fresh");

        let roles: Vec<_> = thread.messages.iter().map(|m| m.message.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(thread.messages[0].message.content.as_deref(), Some("fresh"));
    }
}
