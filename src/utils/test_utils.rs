//! In-process fakes for the model and capability servers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::api::completion::{ModelClient, ModelError, ModelRequest};
use crate::api::{ModelMessage, PendingToolCall, RawArguments};
use crate::mcp::registry::{CapabilityRegistry, CapabilityServer};
use crate::mcp::session::{
    CapabilitySession, RemoteResource, RemoteTool, ResourceContent, SessionFactory, SessionScope,
    ToolCallOutput, ToolContent,
};
use crate::mcp::McpError;

/// Replies with queued messages in order and records every request.
#[derive(Default)]
pub struct ScriptedModelClient {
    replies: Mutex<VecDeque<Result<ModelMessage, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelClient {
    pub fn new(replies: Vec<Result<ModelMessage, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelMessage, ModelError> {
        self.requests.lock().expect("requests lock").push(request);
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".to_string())))
    }
}

/// A model reply requesting one tool call with JSON-string arguments.
pub fn tool_call_reply(call_id: &str, tool_name: &str, arguments: &str) -> ModelMessage {
    ModelMessage::with_tool_calls(vec![PendingToolCall::new(
        call_id,
        tool_name,
        RawArguments::Text(arguments.to_string()),
    )])
}

#[derive(Clone)]
struct FakeTool {
    name: String,
    description: String,
    result: String,
}

#[derive(Clone)]
struct FakeResource {
    uri: String,
    name: Option<String>,
    description: Option<String>,
    text: String,
}

/// Scripted behaviour of one capability server.
#[derive(Clone)]
pub struct FakeServer {
    name: String,
    tools: Vec<FakeTool>,
    resources: Vec<FakeResource>,
    down: bool,
    call_error: Option<String>,
    tool_error: Option<String>,
    read_error: Option<String>,
    delay: Option<Duration>,
}

impl FakeServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            resources: Vec::new(),
            down: false,
            call_error: None,
            tool_error: None,
            read_error: None,
            delay: None,
        }
    }

    pub fn with_tool(mut self, name: &str, description: &str, result: &str) -> Self {
        self.tools.push(FakeTool {
            name: name.to_string(),
            description: description.to_string(),
            result: result.to_string(),
        });
        self
    }

    pub fn with_resource(
        mut self,
        uri: &str,
        name: Option<&str>,
        description: Option<&str>,
        text: &str,
    ) -> Self {
        self.resources.push(FakeResource {
            uri: uri.to_string(),
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            text: text.to_string(),
        });
        self
    }

    /// Every session open fails.
    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    pub fn failing_calls(mut self, message: &str) -> Self {
        self.call_error = Some(message.to_string());
        self
    }

    /// Tool calls succeed at the transport level but carry `isError`.
    pub fn erroring_calls(mut self, message: &str) -> Self {
        self.tool_error = Some(message.to_string());
        self
    }

    pub fn failing_reads(mut self, message: &str) -> Self {
        self.read_error = Some(message.to_string());
        self
    }

    /// Listings sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn config(&self) -> CapabilityServer {
        CapabilityServer::new(
            self.name.clone(),
            Some(format!("http://{}.test", self.name.to_ascii_lowercase())),
            Some("token".to_string()),
        )
    }
}

#[derive(Default)]
struct SessionCounts {
    opened: HashMap<String, usize>,
    closed: HashMap<String, usize>,
    calls: Vec<(String, String, Map<String, Value>)>,
}

pub struct FakeSessionFactory {
    servers: Vec<FakeServer>,
    counts: Arc<Mutex<SessionCounts>>,
}

impl FakeSessionFactory {
    pub fn new(servers: Vec<FakeServer>) -> Self {
        Self {
            servers,
            counts: Arc::new(Mutex::new(SessionCounts::default())),
        }
    }

    pub fn servers(&self) -> Vec<CapabilityServer> {
        self.servers.iter().map(FakeServer::config).collect()
    }

    /// Successful session opens for `server`.
    pub fn opened(&self, server: &str) -> usize {
        let counts = self.counts.lock().expect("counts lock");
        counts.opened.get(server).copied().unwrap_or(0)
    }

    pub fn closed(&self, server: &str) -> usize {
        let counts = self.counts.lock().expect("counts lock");
        counts.closed.get(server).copied().unwrap_or(0)
    }

    /// `(server, tool, arguments)` of every tool call, in order.
    pub fn tool_calls(&self) -> Vec<(String, String, Map<String, Value>)> {
        self.counts.lock().expect("counts lock").calls.clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(
        &self,
        server: &CapabilityServer,
    ) -> Result<Box<dyn CapabilitySession>, McpError> {
        let fake = self
            .servers
            .iter()
            .find(|fake| fake.name == server.name)
            .cloned()
            .ok_or_else(|| McpError::Http(format!("unknown server {}", server.name)))?;
        if fake.down {
            return Err(McpError::Http("connection refused".to_string()));
        }
        *self
            .counts
            .lock()
            .expect("counts lock")
            .opened
            .entry(server.name.clone())
            .or_default() += 1;
        Ok(Box::new(FakeSession {
            server: fake,
            counts: self.counts.clone(),
        }))
    }
}

struct FakeSession {
    server: FakeServer,
    counts: Arc<Mutex<SessionCounts>>,
}

impl FakeSession {
    async fn pause(&self) {
        if let Some(delay) = self.server.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CapabilitySession for FakeSession {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, McpError> {
        self.pause().await;
        Ok(self
            .server
            .tools
            .iter()
            .map(|tool| RemoteTool {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                input_schema: json!({"type": "object", "properties": {}}),
            })
            .collect())
    }

    async fn list_resources(&mut self) -> Result<Vec<RemoteResource>, McpError> {
        self.pause().await;
        Ok(self
            .server
            .resources
            .iter()
            .map(|resource| RemoteResource {
                uri: resource.uri.clone(),
                name: resource.name.clone(),
                description: resource.description.clone(),
                mime_type: Some("text/plain".to_string()),
            })
            .collect())
    }

    async fn read_resource(&mut self, uri: String) -> Result<Vec<ResourceContent>, McpError> {
        if let Some(message) = &self.server.read_error {
            return Err(McpError::Http(message.clone()));
        }
        self.server
            .resources
            .iter()
            .find(|resource| resource.uri == uri)
            .map(|resource| vec![ResourceContent::Text(resource.text.clone())])
            .ok_or_else(|| McpError::Rpc(format!("MCP error -32002: Resource not found: {uri}")))
    }

    async fn call_tool(
        &mut self,
        name: String,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallOutput, McpError> {
        self.counts.lock().expect("counts lock").calls.push((
            self.server.name.clone(),
            name.clone(),
            arguments,
        ));
        if let Some(message) = &self.server.call_error {
            return Err(McpError::Http(message.clone()));
        }
        if let Some(message) = &self.server.tool_error {
            return Ok(ToolCallOutput {
                content: vec![ToolContent::Text(message.clone())],
                is_error: true,
            });
        }
        self.server
            .tools
            .iter()
            .find(|tool| tool.name == name)
            .map(|tool| ToolCallOutput::text(tool.result.clone()))
            .ok_or_else(|| McpError::Rpc(format!("MCP error -32602: Unknown tool: {name}")))
    }

    async fn close(&mut self) -> Result<(), McpError> {
        *self
            .counts
            .lock()
            .expect("counts lock")
            .closed
            .entry(self.server.name.clone())
            .or_default() += 1;
        Ok(())
    }
}

/// Registry over fake servers with a generous timeout.
pub fn registry_with(servers: Vec<FakeServer>) -> CapabilityRegistry {
    let factory = Arc::new(FakeSessionFactory::new(servers));
    CapabilityRegistry::new(
        factory.servers(),
        SessionScope::new(factory, Duration::from_secs(5)),
    )
}
