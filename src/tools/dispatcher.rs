use futures::Stream;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ToolError, ToolRegistry};
use crate::models::{Message, ToolCall};
use crate::sink::OutputSink;

/// Error payload fed back to the model in place of a tool result.
pub fn error_payload(error: &ToolError) -> String {
    json!({ "error": error.to_string() }).to_string()
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    // No-argument tools often stream nothing at all.
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(format!("malformed JSON: {}", e)))
}

async fn run_call(
    registry: &ToolRegistry,
    call: &ToolCall,
    sink: &dyn OutputSink,
) -> Result<String, ToolError> {
    let name = call.function.name.as_str();
    let tool = registry
        .get(name)
        .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
    let args = parse_arguments(&call.function.arguments)?;
    registry.validate_arguments(name, &args)?;

    info!(tool = name, call_id = %call.id, "calling tool");
    tool.handler().call(args, sink).await
}

/// Execute one call. Never fails: every problem becomes an error payload
/// in the returned tool-result message.
pub async fn dispatch_call(registry: &ToolRegistry, call: &ToolCall, sink: &dyn OutputSink) -> Message {
    let name = call.function.name.as_str();

    let content = match run_call(registry, call, sink).await {
        Ok(text) => {
            debug!(tool = name, bytes = text.len(), "tool returned");
            text
        }
        Err(e) => {
            warn!(tool = name, call_id = %call.id, error = %e, "tool call failed");
            error_payload(&e)
        }
    };

    Message::tool_result(call.id.clone(), content)
}

/// Run a turn's tool calls strictly one after another, in the given order.
///
/// The returned stream is lazy: the next call starts only when the caller
/// polls for it, so each result can be persisted before anything else
/// runs. Once `cancel` fires, remaining calls are not started and resolve
/// to a cancellation error instead, keeping one result per call.
pub fn dispatch<'a>(
    registry: &'a ToolRegistry,
    calls: &'a [ToolCall],
    sink: &'a dyn OutputSink,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Message> + Send + 'a {
    async_stream::stream! {
        for call in calls {
            if cancel.is_cancelled() {
                yield Message::tool_result(call.id.clone(), error_payload(&ToolError::Cancelled));
                continue;
            }
            yield dispatch_call(registry, call, sink).await;
        }
    }
}
