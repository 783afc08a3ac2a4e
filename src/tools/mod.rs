mod dispatcher;
mod registry;
mod transactions;
mod web_search;
mod wrapped;

use std::sync::Arc;

use thiserror::Error;

pub use dispatcher::{dispatch, dispatch_call, error_payload};
pub use registry::{FnHandler, RegisteredTool, ToolHandler, ToolRegistry};
pub use transactions::{AddTransactionTool, ADD_TRANSACTION};
pub use web_search::{snippet_for, WebSearchTool, WEB_SEARCH};
pub use wrapped::{SpendingWrappedTool, GENERATE_SPENDING_WRAPPED};

use crate::api::ChatModel;
use crate::config::WebSearchConfig;
use crate::error::Result;
use crate::ledger::Ledger;

/// Per-call failures. These never abort a turn; the dispatcher reports
/// them to the model as `{"error": ...}` payloads.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool failed: {0}")]
    Failed(String),

    #[error("cancelled before execution")]
    Cancelled,
}

/// Registry holding `web_search`, `add_transaction` and
/// `generate_spending_wrapped`.
pub fn builtin_registry(
    web_search: &WebSearchConfig,
    ledger: Arc<dyn Ledger>,
    artifact_model: Arc<dyn ChatModel>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let search = WebSearchTool::new(web_search)?;
    registry.register(WEB_SEARCH, web_search::DESCRIPTION, web_search::schema(), search)?;

    registry.register(
        ADD_TRANSACTION,
        transactions::DESCRIPTION,
        transactions::schema(),
        AddTransactionTool::new(ledger.clone()),
    )?;

    registry.register(
        GENERATE_SPENDING_WRAPPED,
        wrapped::DESCRIPTION,
        wrapped::schema(),
        SpendingWrappedTool::new(artifact_model, ledger),
    )?;

    Ok(registry)
}
