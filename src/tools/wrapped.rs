use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ToolError, ToolHandler};
use crate::api::ChatModel;
use crate::ledger::Ledger;
use crate::models::Message;
use crate::sink::OutputSink;

pub const GENERATE_SPENDING_WRAPPED: &str = "generate_spending_wrapped";

pub const DESCRIPTION: &str = "Generate a playful month-by-month 'Wrapped' slide deck of the \
user's spending from their ledger. The deck is shown to the user directly.";

const ARTIFACT_ID_LEN: usize = 10;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

fn wrapped_prompt(ledger_csv: &str) -> String {
    format!(
        "Create a month-by-month, Wrapped-style slide deck from the bank transactions below.\n\
         Group insights by month and call out habits, trends, wins and surprises.\n\
         Keep it light and funny: roast the transactions, never the person.\n\n\
         Transactions (CSV):\n{}",
        ledger_csv
    )
}

/// Streams a slide deck from a separate artifact model straight to the
/// user. The loop only sees a short acknowledgement.
pub struct SpendingWrappedTool {
    model: Arc<dyn ChatModel>,
    ledger: Arc<dyn Ledger>,
}

impl SpendingWrappedTool {
    pub fn new(model: Arc<dyn ChatModel>, ledger: Arc<dyn Ledger>) -> Self {
        Self { model, ledger }
    }
}

#[async_trait]
impl ToolHandler for SpendingWrappedTool {
    async fn call(&self, _args: Value, sink: &dyn OutputSink) -> Result<String, ToolError> {
        sink.write_progress_note(
            "Generating your spending wrapped...",
            "Reading your transactions and building the slides",
        );

        let csv = self
            .ledger
            .snapshot()
            .await
            .map_err(|e| ToolError::Failed(format!("could not read ledger: {}", e)))?;

        let artifact_id: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(ARTIFACT_ID_LEN)
            .collect();

        let messages = [Message::user(wrapped_prompt(&csv))];
        let mut stream = self
            .model
            .stream_chat(&messages, &[])
            .await
            .map_err(|e| ToolError::Failed(format!("artifact model unavailable: {}", e)))?;

        let mut written = 0usize;
        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!(artifact_id = %artifact_id, error = %e, "artifact stream broke off");
                    return Err(ToolError::Failed(format!("artifact stream failed: {}", e)));
                }
            };
            if let Some(content) = event.content.as_deref() {
                sink.write_content(content);
                written += content.len();
                tokio::task::yield_now().await;
            }
        }

        debug!(artifact_id = %artifact_id, bytes = written, "artifact streamed");
        Ok(json!({ "status": "generated", "artifact_id": artifact_id }).to_string())
    }
}
