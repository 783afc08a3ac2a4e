use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{install_system_message, newest_first, replace_by_id, ThreadGuard, ThreadLocks, ThreadStore};
use crate::error::{LedgerChatError, Result};
use crate::models::{Message, StoredMessage, Thread, ThreadSummary};

/// Process-lifetime store. Every operation runs under one map lock, so
/// each is atomic on its own.
#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: Mutex<HashMap<String, Thread>>,
    locks: ThreadLocks,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn create_thread(&self, title: &str) -> Result<ThreadSummary> {
        let thread = Thread::new(Uuid::new_v4().to_string(), title);
        let summary = thread.summary();
        self.threads.lock().await.insert(thread.id.clone(), thread);
        Ok(summary)
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let threads = self.threads.lock().await;
        Ok(newest_first(threads.values().map(Thread::summary).collect()))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        match self.threads.lock().await.remove(thread_id) {
            Some(_) => Ok(()),
            None => Err(LedgerChatError::ThreadNotFound(thread_id.to_string())),
        }
    }

    async fn update_thread(&self, thread_id: &str, title: &str) -> Result<ThreadSummary> {
        let mut threads = self.threads.lock().await;
        let thread = threads
            .get_mut(thread_id)
            .ok_or_else(|| LedgerChatError::ThreadNotFound(thread_id.to_string()))?;
        thread.title = title.to_string();
        Ok(thread.summary())
    }

    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(thread_id)
            .map(|t| t.messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_all_messages(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }

    async fn append_message(&self, thread_id: &str, message: StoredMessage) -> Result<()> {
        let mut threads = self.threads.lock().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Thread::lazy(thread_id))
            .messages
            .push(message);
        Ok(())
    }

    async fn update_message(&self, thread_id: &str, message: StoredMessage) -> Result<bool> {
        let mut threads = self.threads.lock().await;
        Ok(match threads.get_mut(thread_id) {
            Some(thread) => replace_by_id(thread, message),
            None => false,
        })
    }

    async fn ensure_system_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let mut threads = self.threads.lock().await;
        let thread = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Thread::lazy(thread_id));
        install_system_message(thread, content);
        Ok(())
    }

    async fn lock_thread(&self, thread_id: &str) -> Result<ThreadGuard> {
        Ok(ThreadGuard::local(self.locks.acquire(thread_id).await))
    }
}
