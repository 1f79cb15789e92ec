use thiserror::Error;

use crate::api::completion::ModelError;
use crate::core::config::ConfigError;
use crate::core::history::StoreError;
use crate::mcp::McpError;

pub mod config;
pub mod history;
pub mod orchestrator;
pub mod plugin;
pub mod prompt;
pub mod query;
pub mod security;
pub mod simple;

/// Failures while building or running the assistant. Rejected input and
/// failed tool calls are answers, not errors.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
