use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Message;

#[derive(Serialize)]
pub struct RequestBody<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [Value]>,
}

/// One decoded stream event: optional text, zero or more tool-call
/// fragments, and the terminal signal when the provider sends one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl StreamEvent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_fragment(fragment: ToolCallFragment) -> Self {
        Self {
            tool_calls: vec![fragment],
            ..Default::default()
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

impl ToolCallFragment {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

#[derive(Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
pub struct Choice {
    pub delta: Option<Delta>,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct StreamResponse {
    pub choices: Option<Vec<Choice>>,
}

impl StreamResponse {
    /// Only the first choice is consumed; `n > 1` is never requested.
    pub fn into_event(self) -> Option<StreamEvent> {
        let choice = self.choices?.into_iter().next()?;
        let mut event = StreamEvent {
            finish_reason: choice.finish_reason,
            ..Default::default()
        };

        if let Some(delta) = choice.delta {
            event.content = delta.content.filter(|c| !c.is_empty());
            event.tool_calls = delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| {
                    let (name, arguments) = match tc.function {
                        Some(f) => (f.name, f.arguments),
                        None => (None, None),
                    };
                    ToolCallFragment {
                        index: tc.index,
                        id: tc.id,
                        name,
                        arguments,
                    }
                })
                .collect();
        }

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tool_call_delta() {
        let raw = r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call_9","type":"function","function":{"name":"web_","arguments":"{\"q"}}]},"finish_reason":null}]}"#;
        let event = serde_json::from_str::<StreamResponse>(raw)
            .unwrap()
            .into_event()
            .unwrap();

        assert_eq!(event.content, None);
        assert_eq!(event.finish_reason, None);
        assert_eq!(
            event.tool_calls,
            vec![ToolCallFragment::new(1).id("call_9").name("web_").arguments("{\"q")]
        );
    }

    #[test]
    fn decodes_finish_reason_and_drops_empty_text() {
        let raw = r#"{"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#;
        let event = serde_json::from_str::<StreamResponse>(raw)
            .unwrap()
            .into_event()
            .unwrap();

        assert_eq!(event.content, None);
        assert_eq!(event.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn chunk_without_choices_yields_nothing() {
        let raw = r#"{"id":"gen-1","usage":{"prompt_tokens":3}}"#;
        let parsed: StreamResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.into_event().is_none());
    }

    #[test]
    fn request_body_omits_empty_tool_list() {
        let messages = vec![Message::user("hi")];
        let body = RequestBody {
            model: "m",
            messages: &messages,
            stream: true,
            tools: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("tools").is_none());
        assert_eq!(value["stream"], true);
    }
}
