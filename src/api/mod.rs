pub mod client;
pub mod models;
pub mod streaming;

pub use client::{ChatModel, EventStream, OpenAiChatModel};
pub use models::{RequestBody, StreamEvent, ToolCallFragment};
pub use streaming::{event_stream, SseDecoder, SseFrame};
