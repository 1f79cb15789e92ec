//! Remote capability (MCP) servers: discovery, scoped sessions and tool
//! execution.

use thiserror::Error;

pub mod client;
pub mod executor;
pub mod registry;
pub mod session;
pub mod transport;

/// Prefix of the synthesized tools that proxy a resource read.
pub const RESOURCE_TOOL_PREFIX: &str = "read_resource_";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum McpError {
    #[error("capability server '{0}' has no url configured")]
    MissingUrl(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("{0}")]
    Rpc(String),
    #[error("unexpected MCP response: {0}")]
    Protocol(String),
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        McpError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(err.to_string())
    }
}
