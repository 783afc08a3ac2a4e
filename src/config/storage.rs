use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Transaction CSV; `${VAR}` references are expanded.
    #[serde(default)]
    pub ledger_path: Option<String>,
    /// Directory holding one JSON file per thread.
    #[serde(default)]
    pub store_dir: Option<String>,
}

pub fn default_ledger_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledgerchat")
        .join("transactions.csv")
}

pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledgerchat")
        .join("threads")
}
