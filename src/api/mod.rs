use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod completion;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ROLE_SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ROLE_ASSISTANT, content)
    }

    /// Assistant turn that requested tools. The calls are echoed back to the
    /// model so every following `tool` message has a matching id.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: &[PendingToolCall]) -> Self {
        Self {
            tool_calls: Some(calls.iter().map(ChatToolCall::from).collect()),
            ..Self::plain(ROLE_ASSISTANT, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(ROLE_TOOL, content)
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == ROLE_SYSTEM
    }
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatToolDefinition>>,
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
pub struct ChatCompletionChoice {
    pub message: Option<ChatResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCallResponse>>,
}

#[derive(Deserialize)]
pub struct ChatToolCallResponse {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub function: ChatToolCallFunctionResponse,
}

/// Providers disagree on whether `arguments` is a JSON-encoded string or an
/// inline object, so it is kept as a raw value until execution.
#[derive(Deserialize)]
pub struct ChatToolCallFunctionResponse {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Tool arguments exactly as the model produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArguments {
    Text(String),
    Structured(Value),
}

impl RawArguments {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => RawArguments::Text(text),
            Value::Null => RawArguments::Text(String::new()),
            other => RawArguments::Structured(other),
        }
    }

    pub fn as_wire_string(&self) -> String {
        match self {
            RawArguments::Text(text) => text.clone(),
            RawArguments::Structured(value) => value.to_string(),
        }
    }
}

/// A model-issued tool request, alive for one orchestration turn only.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub raw_arguments: RawArguments,
}

impl PendingToolCall {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        raw_arguments: RawArguments,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            raw_arguments,
        }
    }
}

impl From<ChatToolCallResponse> for PendingToolCall {
    fn from(call: ChatToolCallResponse) -> Self {
        Self {
            call_id: call.id,
            tool_name: call.function.name,
            raw_arguments: RawArguments::from_value(call.function.arguments),
        }
    }
}

impl From<&PendingToolCall> for ChatToolCall {
    fn from(call: &PendingToolCall) -> Self {
        Self {
            id: call.call_id.clone(),
            kind: "function".to_string(),
            function: ChatToolCallFunction {
                name: call.tool_name.clone(),
                arguments: call.raw_arguments.as_wire_string(),
            },
        }
    }
}

/// One non-streaming model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMessage {
    pub content: Option<String>,
    pub tool_calls: Vec<PendingToolCall>,
}

impl ModelMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(calls: Vec<PendingToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

impl From<ChatResponseMessage> for ModelMessage {
    fn from(message: ChatResponseMessage) -> Self {
        Self {
            content: message.content,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(PendingToolCall::from)
                .collect(),
        }
    }
}
