use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};

use super::ToolError;
use crate::error::{LedgerChatError, Result};
use crate::sink::OutputSink;

/// The executable half of a tool.
///
/// `args` has already been parsed and validated against the declared
/// schema. The returned string is fed back to the model verbatim.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, sink: &dyn OutputSink) -> std::result::Result<String, ToolError>;
}

/// Adapter so plain async closures can be registered as handlers.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<String, ToolError>> + Send + 'static,
{
    async fn call(&self, args: Value, _sink: &dyn OutputSink) -> std::result::Result<String, ToolError> {
        (self.0)(args).await
    }
}

pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    validator: JSONSchema,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }
}

/// Name → tool map. Registration order is kept for the schema list sent
/// to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: H,
    ) -> Result<()>
    where
        H: ToolHandler + 'static,
    {
        self.register_arc(name, description, input_schema, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        if self.tools.contains_key(name) {
            return Err(LedgerChatError::ConfigError(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&input_schema)
            .map_err(|e| {
                LedgerChatError::ConfigError(format!("Invalid schema for tool '{}': {}", name, e))
            })?;

        self.order.push(name.to_string());
        self.tools.insert(
            name.to_string(),
            RegisteredTool {
                name: name.to_string(),
                description: description.to_string(),
                input_schema,
                validator,
                handler,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn list(&self) -> Vec<&RegisteredTool> {
        self.order.iter().filter_map(|n| self.tools.get(n)).collect()
    }

    /// Function-tool declarations in chat-completions format.
    pub fn schemas(&self) -> Vec<Value> {
        self.list()
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect()
    }

    pub fn validate_arguments(
        &self,
        tool_name: &str,
        arguments: &Value,
    ) -> std::result::Result<(), ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        if let Err(errors) = tool.validator.validate(arguments) {
            let messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            return Err(ToolError::InvalidArguments(messages.join("; ")));
        }

        Ok(())
    }
}
