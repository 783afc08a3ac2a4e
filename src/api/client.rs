use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;

use crate::api::models::{RequestBody, StreamEvent};
use crate::api::streaming::event_stream;
use crate::error::{LedgerChatError, Result};
use crate::models::Message;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A streaming chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start one streamed completion over `messages`, offering `tools`.
    ///
    /// Errors returned here (and items of the stream) are transport
    /// failures; the terminal signal travels inside the events.
    async fn stream_chat(&self, messages: &[Message], tools: &[Value]) -> Result<EventStream>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    stream_timeout: Duration,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: &str,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        stream_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                LedgerChatError::ConfigError(format!("Invalid authorization header: {}", e))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            stream_timeout,
        })
    }

    /// Same connection settings, different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_chat(&self, messages: &[Message], tools: &[Value]) -> Result<EventStream> {
        let request_body = RequestBody {
            model: &self.model,
            messages,
            stream: true,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LedgerChatError::ApiError { status, message });
        }

        Ok(event_stream(response.bytes_stream(), self.stream_timeout))
    }
}
