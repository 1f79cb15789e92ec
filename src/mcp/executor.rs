//! Executes one model-issued tool call and records its reply.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::{ChatMessage, PendingToolCall, RawArguments};
use crate::core::security::{SecurityValidator, Validation};
use crate::mcp::registry::CapabilityRegistry;
use crate::mcp::session::join_resource_text;
use crate::mcp::RESOURCE_TOOL_PREFIX;
use crate::utils::text::preview;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Continue,
    Failed,
}

pub struct ToolExecutor {
    registry: Arc<CapabilityRegistry>,
    validator: SecurityValidator,
}

impl ToolExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, validator: SecurityValidator) -> Self {
        Self {
            registry,
            validator,
        }
    }

    /// Runs `call` and appends exactly one `tool` message carrying its
    /// call id, whatever the outcome.
    pub async fn execute(
        &self,
        call: &PendingToolCall,
        messages: &mut Vec<ChatMessage>,
    ) -> ToolOutcome {
        info!(tool = %call.tool_name, call_id = %call.call_id, "Executing tool call");
        let (content, outcome) = self.run(call).await;
        debug!(
            tool = %call.tool_name,
            outcome = ?outcome,
            result = %preview(&content, 200),
            "Tool call finished"
        );
        messages.push(ChatMessage::tool_result(call.call_id.clone(), content));
        outcome
    }

    async fn run(&self, call: &PendingToolCall) -> (String, ToolOutcome) {
        let name = call.tool_name.as_str();

        if let Validation::Rejected(reason) = self.validator.validate_tool_name(name) {
            warn!(tool = %name, reason = %reason, "Tool blocked by security policy");
            return (format!("security error: {reason}"), ToolOutcome::Failed);
        }

        let Some(arguments) = parse_arguments(&call.raw_arguments) else {
            warn!(tool = %name, arguments = %call.raw_arguments.as_wire_string(), "Failed to parse tool arguments");
            return (
                "error: invalid tool arguments format".to_string(),
                ToolOutcome::Failed,
            );
        };

        if name.starts_with(RESOURCE_TOOL_PREFIX) {
            return (self.read_resource_tool(name).await, ToolOutcome::Continue);
        }

        self.call_tool(name, arguments).await
    }

    async fn read_resource_tool(&self, tool_name: &str) -> String {
        let Some(uri) = self.registry.resolve_resource_uri_for_tool(tool_name) else {
            return format!("error: resource not found for tool '{tool_name}'");
        };
        let Some(server) = self.registry.resolve_resource_server(uri) else {
            return format!("error: no server found for resource '{uri}'");
        };

        let owned_uri = uri.to_string();
        match self
            .registry
            .sessions()
            .run(server, "reading resource", move |session| {
                session.read_resource(owned_uri)
            })
            .await
        {
            Ok(contents) => join_resource_text(&contents),
            Err(err) => {
                warn!(uri = %uri, server = %server.name, error = %err, "Failed to read resource");
                format!("error reading resource: {err}")
            }
        }
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> (String, ToolOutcome) {
        let Some(server) = self.registry.resolve_tool_server(name) else {
            warn!(
                tool = %name,
                known = self.registry.tool_mapping_count(),
                "No server found for tool"
            );
            return (
                format!("error: no server found for tool '{name}'"),
                ToolOutcome::Failed,
            );
        };

        let tool_name = name.to_string();
        match self
            .registry
            .sessions()
            .run(server, "calling tool", move |session| {
                session.call_tool(tool_name, arguments)
            })
            .await
        {
            Ok(output) => {
                let text = output.first_text();
                let outcome = if output.is_error || text.starts_with("error") {
                    warn!(
                        tool = %name,
                        server = %server.name,
                        is_error = output.is_error,
                        "Tool reported an error"
                    );
                    ToolOutcome::Failed
                } else {
                    ToolOutcome::Continue
                };
                (text, outcome)
            }
            Err(err) => {
                warn!(tool = %name, server = %server.name, error = %err, "Tool call failed");
                (format!("error: tool call failed: {err}"), ToolOutcome::Failed)
            }
        }
    }
}

/// Arguments must decode to a JSON object. Blank text counts as no
/// arguments.
fn parse_arguments(raw: &RawArguments) -> Option<Map<String, Value>> {
    let value = match raw {
        RawArguments::Text(text) if text.trim().is_empty() => return Some(Map::new()),
        RawArguments::Text(text) => serde_json::from_str::<Value>(text).ok()?,
        RawArguments::Structured(value) => value.clone(),
    };
    match value {
        Value::Object(map) => Some(map),
        Value::Null => Some(Map::new()),
        _ => None,
    }
}
