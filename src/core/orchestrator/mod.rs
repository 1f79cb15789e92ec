//! The tool-augmented conversation loop.
//!
//! One query runs at most [`MAX_TOOL_ITERATIONS`] model rounds. Each round
//! either ends the conversation with the model's text or executes every tool
//! call the model asked for and feeds the replies back.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::api::completion::{ModelClient, ModelRequest};
use crate::api::{ChatMessage, ChatToolDefinition, PendingToolCall};
use crate::core::history::ConversationStore;
use crate::core::prompt::{SystemPromptBuilder, LOADING_CAPABILITIES};
use crate::core::query::{classify_query, QueryKind};
use crate::core::security::{SecurityValidator, Validation};
use crate::core::AssistantError;
use crate::mcp::executor::{ToolExecutor, ToolOutcome};
use crate::mcp::registry::{CapabilityRegistry, Tool};


pub const MAX_TOOL_ITERATIONS: usize = 3;

pub const TOOL_EXECUTION_FAILED: &str = "tool execution failed";
pub const MAX_ITERATIONS_REACHED: &str = "max tool call iterations reached";
pub const NO_TOOLS_AVAILABLE: &str = "no tools available";

pub const HELP_TEXT: &str = "🤖 Assistant help

Commands:
• /llm <prompt> - ask something using available tools
• /llm tools - show available mcp tools and resources
• /llm status - show plugin status
• /llm help - show this help";

/// Model settings the orchestrator passes through on every completion.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub system_template: String,
}

pub struct ConversationOrchestrator {
    model: Arc<dyn ModelClient>,
    registry: Arc<CapabilityRegistry>,
    executor: ToolExecutor,
    store: Arc<ConversationStore>,
    validator: SecurityValidator,
    settings: AssistantSettings,
}

impl ConversationOrchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<CapabilityRegistry>,
        store: Arc<ConversationStore>,
        settings: AssistantSettings,
    ) -> Self {
        let validator = SecurityValidator::new();
        Self {
            executor: ToolExecutor::new(Arc::clone(&registry), validator.clone()),
            model,
            registry,
            store,
            validator,
            settings,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    fn system_prompt(&self) -> String {
        let summary = self
            .registry
            .capability_summary()
            .unwrap_or(LOADING_CAPABILITIES);
        SystemPromptBuilder::new(self.settings.system_template.as_str())
            .with_capabilities(summary)
            .build()
    }

    /// Runs the model/tool loop over `messages` and returns the final text.
    /// Model and tool failures come back as short answer strings.
    pub async fn handle_conversation(
        &self,
        mut messages: Vec<ChatMessage>,
        tools: &[ChatToolDefinition],
    ) -> String {
        let system = ChatMessage::system(self.system_prompt());
        if messages.first().is_some_and(ChatMessage::is_system) {
            messages[0] = system;
        } else {
            messages.insert(0, system);
        }

        for iteration in 1..=MAX_TOOL_ITERATIONS {
            debug!(iteration, messages = messages.len(), "Requesting completion");
            let request = ModelRequest {
                model: self.settings.model.clone(),
                api_key: self.settings.api_key.clone(),
                messages: messages.clone(),
                tools: (!tools.is_empty()).then(|| tools.to_vec()),
            };

            let reply = match self.model.complete(request).await {
                Ok(reply) => reply,
                Err(err) => {
                    error!(iteration, error = %err, "Model completion failed");
                    return format!("llm error: {err}");
                }
            };

            if !reply.has_tool_calls() {
                return reply.content.unwrap_or_default();
            }

            info!(
                iteration,
                calls = reply.tool_calls.len(),
                "Model requested tool calls"
            );
            messages.push(ChatMessage::assistant_tool_calls(
                reply.content.clone().unwrap_or_default(),
                &reply.tool_calls,
            ));

            if self.execute_calls(&reply.tool_calls, &mut messages).await == ToolOutcome::Failed {
                warn!(iteration, "Stopping after failed tool call");
                return TOOL_EXECUTION_FAILED.to_string();
            }
        }

        warn!(limit = MAX_TOOL_ITERATIONS, "Tool call iteration limit reached");
        MAX_ITERATIONS_REACHED.to_string()
    }

    /// Executes every call in order, appending one tool message each. The
    /// batch fails when any call fails, after all of them have run.
    async fn execute_calls(
        &self,
        calls: &[PendingToolCall],
        messages: &mut Vec<ChatMessage>,
    ) -> ToolOutcome {
        let mut outcome = ToolOutcome::Continue;
        for call in calls {
            if self.executor.execute(call, messages).await == ToolOutcome::Failed {
                outcome = ToolOutcome::Failed;
            }
        }
        outcome
    }

    /// Answers one chat query for `(user_id, chat_id)`.
    pub async fn process_query(&self, user_id: i64, chat_id: i64, text: &str) -> String {
        if let Validation::Rejected(reason) = self.validator.validate_user_input(text) {
            warn!(user_id, chat_id, reason = %reason, "Rejected user input");
            return format!("invalid input: {reason}");
        }

        match classify_query(text) {
            QueryKind::ShowTools => self.show_tools().await,
            QueryKind::ShowHelp => self.show_help(),
            QueryKind::ShowStatus => self.show_status().await,
            QueryKind::Query(query) => match self.answer(user_id, chat_id, query).await {
                Ok(answer) => answer,
                Err(err) => {
                    error!(user_id, chat_id, error = %err, "Query failed");
                    format!("sorry, something went wrong while processing your request: {err}")
                }
            },
        }
    }

    async fn answer(&self, user_id: i64, chat_id: i64, query: &str) -> Result<String, AssistantError> {
        self.registry.ensure_loaded().await;

        let mut messages = self.store.history_messages(user_id, chat_id)?;
        messages.push(ChatMessage::user(query));

        let tools = self.registry.tool_definitions();
        let answer = self.handle_conversation(messages, &tools).await;

        self.store.save_exchange(user_id, chat_id, query, &answer)?;
        Ok(answer)
    }

    pub async fn show_tools(&self) -> String {
        self.registry.ensure_loaded().await;

        let tools = self.registry.tools();
        if tools.is_empty() {
            return NO_TOOLS_AVAILABLE.to_string();
        }

        let (proxies, regular): (Vec<&Tool>, Vec<&Tool>) =
            tools.iter().partition(|tool| tool.is_resource_proxy());

        let mut out = String::from("🛠️Available Tools:\n\n");
        if !regular.is_empty() {
            let lines: Vec<String> = regular
                .iter()
                .map(|tool| {
                    let server = self
                        .registry
                        .resolve_tool_server(&tool.name)
                        .map_or("unknown", |server| server.name.as_str());
                    format!(
                        "⚙️ `{}` [{}]: {}",
                        tool.name,
                        server,
                        tool.description.as_deref().unwrap_or("no description")
                    )
                })
                .collect();
            out.push_str("mcp tools:\n");
            out.push_str(&lines.join("\n"));
            out.push_str("\n\n");
        }
        if !proxies.is_empty() {
            let lines: Vec<String> = proxies
                .iter()
                .map(|tool| {
                    format!(
                        "📖 `{}`: {}",
                        tool.name,
                        tool.description.as_deref().unwrap_or("no description")
                    )
                })
                .collect();
            out.push_str("resource tools:\n");
            out.push_str(&lines.join("\n"));
        }
        out.trim_end().to_string()
    }

    pub fn show_help(&self) -> String {
        HELP_TEXT.to_string()
    }

    pub async fn show_status(&self) -> String {
        self.registry.ensure_loaded().await;

        let servers = self.registry.servers();
        let server_lines = if servers.is_empty() {
            "❌".to_string()
        } else {
            servers
                .iter()
                .map(|server| format!("• {}", server.name))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let model = if self.settings.model.is_empty() {
            "❌"
        } else {
            self.settings.model.as_str()
        };
        let api_key = if self.settings.api_key.is_some() {
            "✅"
        } else {
            "❌"
        };

        format!(
            "🔧 Assistant status\n\n\
             Configuration:\n\
             • model: {model}\n\
             • api key: {api_key}\n\
             • servers: {}\n\n\
             Loaded:\n\
             • tools: {}\n\
             • resources: {}\n\
             • server mappings: {}\n\n\
             Servers:\n\
             {server_lines}",
            servers.len(),
            self.registry.tools().len(),
            self.registry.resources().len(),
            self.registry.tool_mapping_count(),
        )
    }
}
