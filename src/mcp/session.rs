//! Scoped capability sessions.
//!
//! A session lives for exactly one logical operation (one listing, one read,
//! one call). [`SessionScope::run`] opens it, bounds every step with the
//! request timeout and closes it again on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::mcp::registry::CapabilityServer;
use crate::mcp::McpError;

/// A tool as advertised by a server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A resource as advertised by a server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    pub uri: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceContent {
    Text(String),
    Blob { mime_type: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallOutput {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolCallOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
            is_error: false,
        }
    }

    /// Text of the first content part. Non-text parts are rendered as JSON.
    pub fn first_text(&self) -> String {
        match self.content.first() {
            Some(ToolContent::Text(text)) => text.clone(),
            Some(ToolContent::Other(value)) => value.to_string(),
            None => String::new(),
        }
    }
}

/// Joins the text parts of a resource read, skipping binary parts.
pub fn join_resource_text(contents: &[ResourceContent]) -> String {
    contents
        .iter()
        .filter_map(|content| match content {
            ResourceContent::Text(text) => Some(text.as_str()),
            ResourceContent::Blob { mime_type } => {
                debug!(
                    mime_type = mime_type.as_deref().unwrap_or("unknown"),
                    "Skipping binary resource content"
                );
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
pub trait CapabilitySession: Send {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, McpError>;

    async fn list_resources(&mut self) -> Result<Vec<RemoteResource>, McpError>;

    async fn read_resource(&mut self, uri: String) -> Result<Vec<ResourceContent>, McpError>;

    async fn call_tool(
        &mut self,
        name: String,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallOutput, McpError>;

    async fn close(&mut self) -> Result<(), McpError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, server: &CapabilityServer)
        -> Result<Box<dyn CapabilitySession>, McpError>;
}

#[derive(Clone)]
pub struct SessionScope {
    factory: Arc<dyn SessionFactory>,
    timeout: Duration,
}

impl SessionScope {
    pub fn new(factory: Arc<dyn SessionFactory>, timeout: Duration) -> Self {
        Self { factory, timeout }
    }

    /// Runs `op` against a fresh session for `server`. The session is closed
    /// whether `op` succeeds, fails or times out; a failed close is logged
    /// and never masks the operation's result.
    pub async fn run<T, F>(
        &self,
        server: &CapabilityServer,
        operation: &'static str,
        op: F,
    ) -> Result<T, McpError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Box<dyn CapabilitySession>) -> BoxFuture<'s, Result<T, McpError>>
            + Send,
    {
        debug!(server = %server.name, operation, "Opening capability session");
        let mut session = self
            .bounded(operation, self.factory.open(server))
            .await
            .map_err(|err| {
                warn!(server = %server.name, operation, error = %err, "Failed to open capability session");
                err
            })?;

        let result = self.bounded(operation, op(&mut session)).await;

        if let Err(err) = self.bounded("closing session", session.close()).await {
            warn!(server = %server.name, operation, error = %err, "Failed to close capability session");
        }
        debug!(server = %server.name, operation, ok = result.is_ok(), "Closed capability session");

        result
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T, McpError>>,
    ) -> Result<T, McpError> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                operation,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{FakeServer, FakeSessionFactory};

    fn server(name: &str) -> CapabilityServer {
        CapabilityServer::new(name, Some("http://localhost:9000".to_string()), None)
    }

    #[tokio::test]
    async fn session_is_closed_after_success() {
        let factory = Arc::new(FakeSessionFactory::new(vec![FakeServer::new("alpha")
            .with_tool("get_data", "fetch data", "data")]));
        let scope = SessionScope::new(factory.clone(), Duration::from_secs(5));

        let tools = scope
            .run(&server("alpha"), "listing tools", |session| session.list_tools())
            .await
            .expect("listing should succeed");

        assert_eq!(tools.len(), 1);
        assert_eq!(factory.opened("alpha"), 1);
        assert_eq!(factory.closed("alpha"), 1);
    }

    #[tokio::test]
    async fn session_is_closed_after_operation_error() {
        let factory = Arc::new(FakeSessionFactory::new(vec![
            FakeServer::new("alpha").failing_calls("boom")
        ]));
        let scope = SessionScope::new(factory.clone(), Duration::from_secs(5));

        let err = scope
            .run(&server("alpha"), "calling tool", |session| {
                session.call_tool("get_data".to_string(), Map::new())
            })
            .await
            .expect_err("call should fail");

        assert_eq!(err, McpError::Http("boom".to_string()));
        assert_eq!(factory.closed("alpha"), 1);
    }

    #[tokio::test]
    async fn slow_operations_time_out_and_still_close() {
        let factory = Arc::new(FakeSessionFactory::new(vec![FakeServer::new("alpha")
            .with_delay(Duration::from_millis(200))]));
        let scope = SessionScope::new(factory.clone(), Duration::from_millis(20));

        let err = scope
            .run(&server("alpha"), "listing tools", |session| session.list_tools())
            .await
            .expect_err("listing should time out");

        assert!(matches!(
            err,
            McpError::Timeout {
                operation: "listing tools",
                ..
            }
        ));
        assert_eq!(factory.closed("alpha"), 1);
    }

    #[tokio::test]
    async fn open_failure_is_reported_without_close() {
        let factory = Arc::new(FakeSessionFactory::new(vec![FakeServer::new("alpha").down()]));
        let scope = SessionScope::new(factory.clone(), Duration::from_secs(5));

        let result = scope
            .run(&server("alpha"), "listing tools", |session| session.list_tools())
            .await;

        assert!(result.is_err());
        assert_eq!(factory.opened("alpha"), 0);
        assert_eq!(factory.closed("alpha"), 0);
    }

    #[test]
    fn resource_text_skips_blobs() {
        let contents = vec![
            ResourceContent::Text("first".to_string()),
            ResourceContent::Blob {
                mime_type: Some("image/png".to_string()),
            },
            ResourceContent::Text("second".to_string()),
        ];
        assert_eq!(join_resource_text(&contents), "first\nsecond");
    }

    #[test]
    fn first_text_uses_leading_part() {
        let output = ToolCallOutput {
            content: vec![
                ToolContent::Text("one".to_string()),
                ToolContent::Text("two".to_string()),
            ],
            is_error: false,
        };
        assert_eq!(output.first_text(), "one");
        assert_eq!(ToolCallOutput::default().first_text(), "");
    }
}
