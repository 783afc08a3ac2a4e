#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use ledgerchat::api::{ChatModel, EventStream, StreamEvent, ToolCallFragment};
use ledgerchat::error::{LedgerChatError, Result};
use ledgerchat::models::Message;
use ledgerchat::orchestrator::OrchestratorContext;
use ledgerchat::sink::ChannelSink;
use ledgerchat::store::{InMemoryThreadStore, ThreadStore};
use ledgerchat::tools::ToolRegistry;

pub const SYSTEM_PROMPT: &str = "You are a test assistant.";

/// What the fake model does on one call.
pub enum Reply {
    Events(Vec<StreamEvent>),
    /// The stream yields these events, then a transport error.
    BrokenStream(Vec<StreamEvent>),
    /// The call itself fails.
    CallFails,
    /// The stream yields these events and then never produces another.
    Stalls(Vec<StreamEvent>),
}

/// `ChatModel` that plays back canned replies in order. Once the script
/// runs out it keeps answering with `fallback`, if any.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Vec<StreamEvent>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(events: Vec<StreamEvent>) -> Self {
        Self {
            fallback: Some(events),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists the model was called with, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, messages: &[Message], _tools: &[Value]) -> Result<EventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());

        let reply = self.replies.lock().unwrap().pop_front();
        let reply = match reply {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(events) => Reply::Events(events.clone()),
                None => panic!("scripted model called more often than scripted"),
            },
        };

        match reply {
            Reply::Events(events) => Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok)))),
            Reply::BrokenStream(events) => {
                let mut items: Vec<Result<StreamEvent>> = events.into_iter().map(Ok).collect();
                items.push(Err(LedgerChatError::Timeout));
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Reply::Stalls(events) => Ok(Box::pin(
                futures::stream::iter(events.into_iter().map(Ok)).chain(futures::stream::pending()),
            )),
            Reply::CallFails => Err(LedgerChatError::ApiError {
                status: 500,
                message: "upstream exploded".to_string(),
            }),
        }
    }
}

pub fn text(content: &str) -> StreamEvent {
    StreamEvent::text(content)
}

pub fn finish(reason: &str) -> StreamEvent {
    StreamEvent::finish(reason)
}

/// One tool call streamed as id+name first, then the arguments in two
/// pieces, then the `tool_calls` signal.
pub fn tool_turn(index: usize, id: &str, name: &str, arguments: &str) -> Vec<StreamEvent> {
    let split = arguments.len() / 2;
    let split = (split..=arguments.len())
        .find(|i| arguments.is_char_boundary(*i))
        .unwrap_or(arguments.len());
    vec![
        StreamEvent::tool_fragment(ToolCallFragment::new(index).id(id).name(name)),
        StreamEvent::tool_fragment(ToolCallFragment::new(index).arguments(&arguments[..split])),
        StreamEvent::tool_fragment(ToolCallFragment::new(index).arguments(&arguments[split..])),
        finish("tool_calls"),
    ]
}

pub fn answer(content: &str) -> Vec<StreamEvent> {
    vec![text(content), finish("stop")]
}

pub struct Harness {
    pub ctx: OrchestratorContext,
    pub model: Arc<ScriptedModel>,
    pub store: Arc<InMemoryThreadStore>,
    pub events: tokio::sync::mpsc::UnboundedReceiver<ledgerchat::sink::SinkEvent>,
}

pub fn harness(model: ScriptedModel, tools: ToolRegistry, max_turns: usize) -> Harness {
    let model = Arc::new(model);
    let store = Arc::new(InMemoryThreadStore::new());
    let (sink, events) = ChannelSink::new();
    let ctx = OrchestratorContext {
        model: model.clone(),
        tools: Arc::new(tools),
        store: store.clone() as Arc<dyn ThreadStore>,
        sink: Arc::new(sink),
        system_prompt: SYSTEM_PROMPT.to_string(),
        max_turns,
    };
    Harness {
        ctx,
        model,
        store,
        events,
    }
}
