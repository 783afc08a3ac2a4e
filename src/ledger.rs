use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

pub const LEDGER_HEADER: &str = "date,description,amount,transaction_type";
pub const EMPTY_LEDGER: &str = "No transaction data available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub transaction_type: TransactionType,
}

impl Transaction {
    fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{}",
            csv_field(&self.date),
            csv_field(&self.description),
            self.amount,
            self.transaction_type.as_str()
        )
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append-only store of transactions shared by every conversation.
///
/// Implementations serialize their own writes; callers on different
/// threads may append concurrently.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn append(&self, transaction: &Transaction) -> Result<()>;

    /// The ledger rendered as CSV text, for prompts.
    async fn snapshot(&self) -> Result<String>;
}

pub struct CsvLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Ledger for CsvLedger {
    async fn append(&self, transaction: &Transaction) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let needs_header = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut out = String::new();
        if needs_header {
            out.push_str(LEDGER_HEADER);
            out.push('\n');
        }
        out.push_str(&transaction.to_csv_row());
        out.push('\n');

        file.write_all(out.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), "ledger row appended");
        Ok(())
    }

    async fn snapshot(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if !contents.trim().is_empty() => Ok(contents),
            Ok(_) => Ok(EMPTY_LEDGER.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EMPTY_LEDGER.to_string()),
            Err(e) => Err(e.into()),
        }
    }
}
