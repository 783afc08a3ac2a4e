use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{AggregatedTurn, DeltaAggregator, FinishReason};
use crate::api::{ChatModel, EventStream};
use crate::config::Config;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::{Message, StoredMessage, ToolCall};
use crate::sink::OutputSink;
use crate::store::ThreadStore;
use crate::tools::{dispatch, ToolRegistry};

/// Everything one request's loop needs. Built once by the caller and
/// shared across requests.
pub struct OrchestratorContext {
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<ToolRegistry>,
    pub store: Arc<dyn ThreadStore>,
    pub sink: Arc<dyn OutputSink>,
    pub system_prompt: String,
    pub max_turns: usize,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub thread_id: String,
    pub prompt_id: String,
    pub prompt: String,
    pub response_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Still requesting tools when the turn budget ran out.
    MaxTurnsExceeded,
    /// The model call or its stream failed.
    ModelFailure(String),
    /// The stream ended with a terminal signal the loop does not act on.
    UnrecognizedFinish(Option<String>),
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::MaxTurnsExceeded => write!(f, "gave up after reaching the turn limit"),
            AbortReason::ModelFailure(e) => write!(f, "model call failed: {}", e),
            AbortReason::UnrecognizedFinish(Some(reason)) => {
                write!(f, "model stopped with unexpected reason '{}'", reason)
            }
            AbortReason::UnrecognizedFinish(None) => write!(f, "model stream ended without a finish reason"),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingModel,
    Deciding,
    ToolExecution,
    Completed,
    Aborted,
}

enum StreamEnd {
    Finished(AggregatedTurn),
    Failed(String),
    Cancelled,
}

/// System prompt: today's date, the configured instructions, and the
/// ledger as CSV.
pub async fn build_system_prompt(config: &Config, ledger: &dyn Ledger) -> Result<String> {
    let transactions = ledger.snapshot().await?;
    Ok(format!(
        "Today is {}.\n\n{}\n\n# TRANSACTIONS\nThe user's transactions in CSV format:\n\n{}",
        Config::get_current_date(),
        config.system_prompt,
        transactions.trim_end()
    ))
}

/// Run one chat request against a thread until the model answers, the
/// turn budget runs out, or something fails.
///
/// `Err` means the thread store failed. Model and stream problems end the
/// loop with [`RunOutcome::Aborted`]; whatever was persisted before that
/// point stays.
#[tracing::instrument(skip_all, fields(thread_id = %request.thread_id))]
pub async fn run(
    ctx: &OrchestratorContext,
    request: ChatRequest,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let thread_id = request.thread_id.as_str();
    let _thread_guard = ctx.store.lock_thread(thread_id).await?;

    ctx.store
        .ensure_system_message(thread_id, &ctx.system_prompt)
        .await?;
    let mut history = ctx.store.get_messages(thread_id).await?;

    let prompt = Message::user(request.prompt.clone());
    history.push(prompt.clone());
    ctx.store
        .append_message(thread_id, StoredMessage::new(request.prompt_id.clone(), prompt))
        .await?;

    let schemas = ctx.tools.schemas();
    let mut final_text = String::new();
    let mut turn = 0;

    while turn < ctx.max_turns {
        if cancel.is_cancelled() {
            return Ok(abort(turn, AbortReason::Cancelled));
        }
        turn += 1;
        debug!(turn, state = ?LoopState::AwaitingModel, "calling model");

        let stream = match ctx.model.stream_chat(&history, &schemas).await {
            Ok(stream) => stream,
            Err(e) => return Ok(abort(turn, AbortReason::ModelFailure(e.to_string()))),
        };

        let result = match consume(stream, ctx.sink.as_ref(), cancel, &mut final_text).await {
            StreamEnd::Finished(result) => result,
            StreamEnd::Failed(e) => return Ok(abort(turn, AbortReason::ModelFailure(e))),
            StreamEnd::Cancelled => return Ok(abort(turn, AbortReason::Cancelled)),
        };
        debug!(turn, state = ?LoopState::Deciding, finish = ?result.finish_reason, "stream ended");

        match result.finish_reason {
            FinishReason::ToolCalls if !result.tool_calls.is_empty() => {
                let calls = with_call_ids(result.tool_calls);
                info!(
                    turn,
                    state = ?LoopState::ToolExecution,
                    tools = ?calls.iter().map(|c| c.function.name.as_str()).collect::<Vec<_>>(),
                    "executing tool calls"
                );

                let tool_request = Message::tool_request(calls.clone());
                history.push(tool_request.clone());
                persist(ctx, thread_id, tool_request).await?;

                let results = dispatch(&ctx.tools, &calls, ctx.sink.as_ref(), cancel);
                futures::pin_mut!(results);
                while let Some(tool_result) = results.next().await {
                    history.push(tool_result.clone());
                    persist(ctx, thread_id, tool_result).await?;
                }
            }
            FinishReason::Stop => {
                let answer = Message::assistant(final_text);
                ctx.store
                    .append_message(thread_id, StoredMessage::new(request.response_id.clone(), answer))
                    .await?;

                info!(turn, state = ?LoopState::Completed, "request completed");
                return Ok(RunOutcome::Completed);
            }
            FinishReason::ToolCalls => {
                return Ok(abort(
                    turn,
                    AbortReason::UnrecognizedFinish(Some("tool_calls".to_string())),
                ));
            }
            FinishReason::Other(reason) => {
                return Ok(abort(turn, AbortReason::UnrecognizedFinish(Some(reason))));
            }
            FinishReason::Missing => {
                return Ok(abort(turn, AbortReason::UnrecognizedFinish(None)));
            }
        }
    }

    Ok(abort(turn, AbortReason::MaxTurnsExceeded))
}

fn abort(turn: usize, reason: AbortReason) -> RunOutcome {
    warn!(turn, state = ?LoopState::Aborted, reason = %reason, "request aborted");
    RunOutcome::Aborted(reason)
}

async fn persist(ctx: &OrchestratorContext, thread_id: &str, message: Message) -> Result<()> {
    ctx.store
        .append_message(thread_id, StoredMessage::new(Uuid::new_v4().to_string(), message))
        .await
}

/// Calls streamed without an id still need one for result correlation.
fn with_call_ids(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
            call
        })
        .collect()
}

async fn consume(
    mut stream: EventStream,
    sink: &dyn OutputSink,
    cancel: &CancellationToken,
    text: &mut String,
) -> StreamEnd {
    let mut aggregator = DeltaAggregator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if let Some(fragment) = aggregator.push(event) {
                    sink.write_content(&fragment);
                    text.push_str(&fragment);
                    tokio::task::yield_now().await;
                }
            }
            Some(Err(e)) => return StreamEnd::Failed(e.to_string()),
            None => return StreamEnd::Finished(aggregator.finish()),
        }
    }
}
