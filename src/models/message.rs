use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One model-visible conversation entry, in chat-completions wire shape.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant message requesting tool execution; carries no text.
    pub fn tool_request(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn is_tool_request(&self) -> bool {
        self.role == Role::Assistant
            && self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Tool traffic is internal to the loop and never shown to end users.
    pub fn is_user_visible(&self) -> bool {
        self.role != Role::Tool && !self.is_tool_request()
    }
}

/// A message as kept by a thread store, with its optional external id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub message: Message,
}

impl StoredMessage {
    pub fn new(id: impl Into<String>, message: Message) -> Self {
        Self {
            id: Some(id.into()),
            message,
        }
    }

    pub fn anonymous(message: Message) -> Self {
        Self { id: None, message }
    }
}
