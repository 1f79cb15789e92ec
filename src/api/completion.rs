//! Non-streaming chat completion against OpenAI-compatible endpoints.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ChatCompletionResponse, ChatMessage, ChatRequest, ChatToolDefinition, ModelMessage};
use crate::utils::url::construct_api_url;

const COMPLETION_TEMPERATURE: f32 = 0.7;
const CONNECT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API request failed with status {status}: {summary}")]
    Status { status: u16, summary: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
}

/// Everything needed for one completion call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub api_key: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ChatToolDefinition>>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelMessage, ModelError>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
            .timeout(timeout)
            .build()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelMessage, ModelError> {
        let ModelRequest {
            model,
            api_key,
            messages,
            tools,
        } = request;

        info!(model = %model, messages = messages.len(), tools = tools.as_ref().map_or(0, Vec::len), "Starting llm completion");

        let body = ChatRequest {
            model: model.clone(),
            messages,
            stream: false,
            temperature: Some(COMPLETION_TEMPERATURE),
            tools,
        };

        let chat_url = construct_api_url(&self.base_url, "chat/completions");
        let mut http_request = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json");
        if let Some(api_key) = api_key.as_deref().filter(|key| !key.is_empty()) {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request.json(&body).send().await.map_err(|err| {
            if err.is_timeout() {
                ModelError::Timeout(self.timeout.as_secs())
            } else {
                ModelError::Transport(err.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ModelError::Status {
                status,
                summary: summarize_api_error(&error_text),
            });
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|err| ModelError::InvalidResponse(err.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices returned".to_string()))?;
        debug!(model = %model, finish_reason = choice.finish_reason.as_deref().unwrap_or("<none>"), "Completed llm completion");

        choice
            .message
            .map(ModelMessage::from)
            .ok_or_else(|| ModelError::InvalidResponse("choice carries no message".to_string()))
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Collapse a provider error body into a single line for the user.
fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}
