//! lotb's LLM assistant: a chat-bot plugin that answers queries with a
//! language model and lets it call tools exposed by remote MCP servers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation loop, history, prompts, input checks,
//!   configuration and the [`core::plugin::AssistantPlugin`] entry point.
//! - [`mcp`] discovers tools and resources on capability servers and executes
//!   tool calls through short-lived streamable HTTP sessions.
//! - [`api`] defines chat payloads and the OpenAI-compatible model client.
//!
//! The binary (`src/main.rs`) initializes logging and routes through
//! [`crate::cli::main`] to run the assistant from a terminal.

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
