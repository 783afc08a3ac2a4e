use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ToolError, ToolHandler};
use crate::ledger::{Ledger, Transaction};
use crate::sink::OutputSink;

pub const ADD_TRANSACTION: &str = "add_transaction";

pub const DESCRIPTION: &str = "Record a new transaction in the user's ledger. Use it when the user \
reports money they spent or received.";

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "date": {
                "type": "string",
                "description": "Transaction date, YYYY-MM-DD."
            },
            "description": {
                "type": "string",
                "description": "What the money was for."
            },
            "amount": {
                "type": "number",
                "exclusiveMinimum": 0,
                "description": "Positive amount; direction is given by transaction_type."
            },
            "transaction_type": {
                "type": "string",
                "enum": ["credit", "debit"]
            }
        },
        "required": ["date", "description", "amount", "transaction_type"],
        "additionalProperties": false
    })
}

pub struct AddTransactionTool {
    ledger: Arc<dyn Ledger>,
}

impl AddTransactionTool {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl ToolHandler for AddTransactionTool {
    async fn call(&self, args: Value, sink: &dyn OutputSink) -> Result<String, ToolError> {
        let transaction: Transaction =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        sink.write_progress_note(
            "Updating your ledger...",
            &format!(
                "{} {} on {}: {}",
                transaction.transaction_type.as_str(),
                transaction.amount,
                transaction.date,
                transaction.description
            ),
        );

        self.ledger
            .append(&transaction)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        Ok(json!({ "status": "recorded", "transaction": transaction }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CsvLedger;
    use crate::sink::ChannelSink;
    use tempfile::TempDir;

    #[tokio::test]
    async fn records_row_and_echoes_transaction() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(CsvLedger::new(dir.path().join("tx.csv")));
        let tool = AddTransactionTool::new(ledger.clone());
        let (sink, _rx) = ChannelSink::new();

        let out = tool
            .call(
                json!({
                    "date": "2025-02-01",
                    "description": "Rent",
                    "amount": 12000,
                    "transaction_type": "debit"
                }),
                &sink,
            )
            .await
            .unwrap();

        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], "recorded");
        assert_eq!(value["transaction"]["transaction_type"], "debit");
        assert!(ledger.snapshot().await.unwrap().contains("2025-02-01,Rent,12000,debit"));
    }
}
