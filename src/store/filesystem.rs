use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    install_system_message, newest_first, replace_by_id, FileLock, ThreadGuard, ThreadLocks, ThreadStore,
};
use crate::error::{LedgerChatError, Result};
use crate::models::{Message, StoredMessage, Thread, ThreadSummary};

const STORE_LOCK: &str = ".store.lock";

/// One pretty-printed JSON file per thread under `dir`.
///
/// Every mutation rewrites the thread file through its own temp file and a
/// rename, so readers see either the old or the new document. Mutations
/// hold an advisory lock on `.store.lock` and chat requests hold one on
/// `thread-<id>.lock`, so several processes can share a directory.
pub struct FilesystemThreadStore {
    dir: PathBuf,
    io_lock: Mutex<()>,
    locks: ThreadLocks,
}

/// Both locks of one mutation. The file lock goes first on drop.
struct StoreGuard<'a> {
    _file: FileLock,
    _io: MutexGuard<'a, ()>,
}

impl FilesystemThreadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            io_lock: Mutex::new(()),
            locks: ThreadLocks::new(),
        }
    }

    fn checked_id(thread_id: &str) -> Result<&str> {
        let valid = !thread_id.is_empty()
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(LedgerChatError::StoreError(format!(
                "invalid thread id '{}'",
                thread_id
            )));
        }
        Ok(thread_id)
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf> {
        let id = Self::checked_id(thread_id)?;
        Ok(self.dir.join(format!("thread-{}.json", id)))
    }

    fn request_lock_path(&self, thread_id: &str) -> Result<PathBuf> {
        let id = Self::checked_id(thread_id)?;
        Ok(self.dir.join(format!("thread-{}.lock", id)))
    }

    async fn exclusive(&self) -> Result<StoreGuard<'_>> {
        let io = self.io_lock.lock().await;
        let file = FileLock::acquire(self.dir.join(STORE_LOCK)).await?;
        Ok(StoreGuard { _file: file, _io: io })
    }

    async fn read(&self, thread_id: &str) -> Result<Option<Thread>> {
        let path = self.thread_path(thread_id)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, thread: &Thread) -> Result<()> {
        let path = self.thread_path(&thread.id)?;
        let dir = self.dir.clone();
        let content = serde_json::to_string_pretty(thread)?;

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| LedgerChatError::StoreError(format!("write task failed: {}", e)))??;

        debug!(thread_id = %thread.id, messages = thread.messages.len(), "thread saved");
        Ok(())
    }

    async fn read_or_lazy(&self, thread_id: &str) -> Result<Thread> {
        Ok(self
            .read(thread_id)
            .await?
            .unwrap_or_else(|| Thread::lazy(thread_id)))
    }

    async fn read_existing(&self, thread_id: &str) -> Result<Thread> {
        self.read(thread_id)
            .await?
            .ok_or_else(|| LedgerChatError::ThreadNotFound(thread_id.to_string()))
    }
}

#[async_trait]
impl ThreadStore for FilesystemThreadStore {
    async fn create_thread(&self, title: &str) -> Result<ThreadSummary> {
        let _guard = self.exclusive().await?;
        let thread = Thread::new(Uuid::new_v4().to_string(), title);
        self.write(&thread).await?;
        Ok(thread.summary())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_thread = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("thread-"));
            if !is_thread {
                continue;
            }

            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Thread>(&content) {
                Ok(thread) => summaries.push(thread.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable thread file"),
            }
        }

        Ok(newest_first(summaries))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _guard = self.exclusive().await?;
        let path = self.thread_path(thread_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LedgerChatError::ThreadNotFound(thread_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_thread(&self, thread_id: &str, title: &str) -> Result<ThreadSummary> {
        let _guard = self.exclusive().await?;
        let mut thread = self.read_existing(thread_id).await?;
        thread.title = title.to_string();
        self.write(&thread).await?;
        Ok(thread.summary())
    }

    async fn get_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .read(thread_id)
            .await?
            .map(|t| t.messages.into_iter().map(|m| m.message).collect())
            .unwrap_or_default())
    }

    async fn get_all_messages(&self, thread_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .read(thread_id)
            .await?
            .map(|t| t.messages)
            .unwrap_or_default())
    }

    async fn append_message(&self, thread_id: &str, message: StoredMessage) -> Result<()> {
        let _guard = self.exclusive().await?;
        let mut thread = self.read_or_lazy(thread_id).await?;
        thread.messages.push(message);
        self.write(&thread).await
    }

    async fn update_message(&self, thread_id: &str, message: StoredMessage) -> Result<bool> {
        let _guard = self.exclusive().await?;
        let Some(mut thread) = self.read(thread_id).await? else {
            return Ok(false);
        };
        if !replace_by_id(&mut thread, message) {
            return Ok(false);
        }
        self.write(&thread).await?;
        Ok(true)
    }

    async fn ensure_system_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let _guard = self.exclusive().await?;
        let mut thread = self.read_or_lazy(thread_id).await?;
        install_system_message(&mut thread, content);
        self.write(&thread).await
    }

    async fn lock_thread(&self, thread_id: &str) -> Result<ThreadGuard> {
        let path = self.request_lock_path(thread_id)?;
        let local = self.locks.acquire(thread_id).await;
        let file = FileLock::acquire(path).await?;
        Ok(ThreadGuard::with_file(local, file))
    }
}
