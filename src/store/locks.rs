use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{LedgerChatError, Result};

/// One async mutex per thread id, created on first use. Entries nobody
/// holds or waits on are dropped on the next acquire.
#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Exclusive OS advisory lock on a file, released on drop.
///
/// Other processes using the same lock file block until it is released.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub async fn acquire(path: PathBuf) -> Result<Self> {
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| LedgerChatError::StoreError(format!("lock task failed: {}", e)))??;

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Held for the duration of one chat request on a thread.
pub struct ThreadGuard {
    // Released before the in-process lock.
    _file: Option<FileLock>,
    _local: OwnedMutexGuard<()>,
}

impl ThreadGuard {
    pub fn local(guard: OwnedMutexGuard<()>) -> Self {
        Self {
            _file: None,
            _local: guard,
        }
    }

    pub fn with_file(guard: OwnedMutexGuard<()>, file: FileLock) -> Self {
        Self {
            _file: Some(file),
            _local: guard,
        }
    }
}
