//! Entry point for the host bot: one chat event in, at most one reply out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::completion::{ModelClient, OpenAiClient};
use crate::core::config::Config;
use crate::core::history::ConversationStore;
use crate::core::orchestrator::{AssistantSettings, ConversationOrchestrator, HELP_TEXT};
use crate::core::query::{command_query, TriggerMatcher};
use crate::core::simple::SimpleChat;
use crate::core::AssistantError;
use crate::mcp::client::HttpSessionFactory;
use crate::mcp::registry::CapabilityRegistry;
use crate::mcp::session::{SessionFactory, SessionScope};

pub const TRIGGER_GREETING: &str = "yes? 🦕";
pub const EMPTY_QUERY: &str = "Please provide a query";
pub const MISSING_IDENTITY: &str = "User or chat information missing";
pub const MESSAGE_UNAVAILABLE: &str = "Message is unavailable";

/// The parts of an incoming chat message the assistant looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatEvent {
    pub user_id: Option<i64>,
    pub chat_id: Option<i64>,
    pub text: Option<String>,
    pub quoted_text: Option<String>,
}

impl ChatEvent {
    pub fn new(user_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            chat_id: Some(chat_id),
            text: Some(text.into()),
            quoted_text: None,
        }
    }

    pub fn quoting(mut self, quoted: impl Into<String>) -> Self {
        self.quoted_text = Some(quoted.into());
        self
    }
}

pub enum Mode {
    Assistant(ConversationOrchestrator),
    Simple(SimpleChat),
}

pub struct AssistantPlugin {
    mode: Mode,
    trigger: Option<TriggerMatcher>,
}

impl AssistantPlugin {
    pub fn new(mode: Mode, trigger: Option<TriggerMatcher>) -> Self {
        Self { mode, trigger }
    }

    /// Builds the production plugin: OpenAI-compatible model client,
    /// streamable HTTP capability sessions and the SQLite history.
    pub fn from_config(config: &Config) -> Result<Self, AssistantError> {
        for warning in config.validate() {
            warn!("{warning}");
        }

        let timeout = config.request_timeout();
        let model = Arc::new(OpenAiClient::new(config.base_url_or_default(), timeout)?);
        let sessions = Arc::new(HttpSessionFactory::new(timeout)?);
        let store = Arc::new(ConversationStore::open(
            &config.database_path()?,
            config.effective_max_history(),
        )?);

        let plugin = Self::with_parts(config, model, sessions, store);
        info!("{}", config.info());
        Ok(plugin)
    }

    /// Builds the plugin around caller-supplied model, session and storage
    /// backends.
    pub fn with_parts(
        config: &Config,
        model: Arc<dyn ModelClient>,
        sessions: Arc<dyn SessionFactory>,
        store: Arc<ConversationStore>,
    ) -> Self {
        let mode = if config.assistant_mode {
            let registry = Arc::new(CapabilityRegistry::new(
                config.capability_servers(),
                SessionScope::new(sessions, config.request_timeout()),
            ));
            Mode::Assistant(ConversationOrchestrator::new(
                model,
                registry,
                store,
                AssistantSettings {
                    model: config.model_or_default().to_string(),
                    api_key: config.api_key.clone(),
                    system_template: config.assistant_template().to_string(),
                },
            ))
        } else {
            Mode::Simple(SimpleChat::new(
                model,
                store,
                config.model_or_default(),
                config.api_key.clone(),
            ))
        };
        let trigger = config.trigger_name.as_deref().and_then(TriggerMatcher::new);
        Self::new(mode, trigger)
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    fn is_assistant(&self) -> bool {
        matches!(self.mode, Mode::Assistant(_))
    }

    fn empty_command_reply(&self) -> String {
        if self.is_assistant() {
            HELP_TEXT.to_string()
        } else {
            EMPTY_QUERY.to_string()
        }
    }

    /// Handles a chat event. Returns `None` when the message is not
    /// addressed to the assistant.
    pub async fn handle(&self, event: &ChatEvent) -> Option<String> {
        let Some(text) = event.text.as_deref().map(str::trim) else {
            return Some(if self.is_assistant() {
                HELP_TEXT.to_string()
            } else {
                MESSAGE_UNAVAILABLE.to_string()
            });
        };

        let query = if let Some(query) = command_query(text) {
            if query.is_empty() {
                return Some(self.empty_command_reply());
            }
            query
        } else {
            let query = self.trigger.as_ref()?.strip(text)?;
            if query.is_empty() {
                return Some(TRIGGER_GREETING.to_string());
            }
            query
        };

        let (Some(user_id), Some(chat_id)) = (event.user_id, event.chat_id) else {
            return Some(MISSING_IDENTITY.to_string());
        };

        debug!(user_id, chat_id, "Dispatching assistant query");
        let reply = match &self.mode {
            Mode::Assistant(orchestrator) => {
                orchestrator.process_query(user_id, chat_id, &query).await
            }
            Mode::Simple(chat) => {
                chat.process(user_id, chat_id, &query, event.quoted_text.as_deref())
                    .await
            }
        };
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::completion::ModelError;
    use crate::api::ModelMessage;
    use crate::core::config::CapabilityServerConfig;
    use crate::utils::test_utils::{FakeServer, FakeSessionFactory, ScriptedModelClient};

    fn config(assistant_mode: bool, trigger: Option<&str>) -> Config {
        Config {
            model: Some("gpt-test".to_string()),
            api_key: Some("sk".to_string()),
            assistant_mode,
            trigger_name: trigger.map(str::to_string),
            capability_servers: vec![CapabilityServerConfig {
                name: Some("Weather".to_string()),
                url: Some("http://weather.test".to_string()),
                auth_token: None,
            }],
            ..Default::default()
        }
    }

    fn plugin(
        config: &Config,
        replies: Vec<Result<ModelMessage, ModelError>>,
    ) -> (Arc<ScriptedModelClient>, AssistantPlugin) {
        let model = Arc::new(ScriptedModelClient::new(replies));
        let sessions = Arc::new(FakeSessionFactory::new(vec![FakeServer::new("Weather")
            .with_tool("get_weather", "current weather", "sunny")]));
        let store = Arc::new(ConversationStore::open_in_memory(3).expect("store"));
        let plugin = AssistantPlugin::with_parts(config, model.clone(), sessions, store);
        (model, plugin)
    }

    #[tokio::test]
    async fn command_prefix_routes_to_assistant() {
        let (model, plugin) = plugin(&config(true, None), vec![Ok(ModelMessage::text("hi!"))]);

        let reply = plugin.handle(&ChatEvent::new(1, 1, "/llm hello")).await;

        assert_eq!(reply.as_deref(), Some("hi!"));
        let requests = model.requests();
        assert_eq!(requests[0].messages.last().map(|m| m.content.as_str()), Some("hello"));
        assert!(requests[0].tools.is_some());
    }

    #[tokio::test]
    async fn empty_command_shows_help_or_asks_for_query() {
        let (_, assistant) = plugin(&config(true, None), vec![]);
        assert_eq!(
            assistant.handle(&ChatEvent::new(1, 1, "/llm")).await.as_deref(),
            Some(HELP_TEXT)
        );

        let (_, simple) = plugin(&config(false, None), vec![]);
        assert_eq!(
            simple.handle(&ChatEvent::new(1, 1, "/llm   ")).await.as_deref(),
            Some(EMPTY_QUERY)
        );
    }

    #[tokio::test]
    async fn glued_command_prefix_is_not_a_command() {
        let (model, plugin) = plugin(&config(true, None), vec![]);
        assert_eq!(plugin.handle(&ChatEvent::new(1, 1, "/llmfoo bar")).await, None);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn trigger_name_starts_a_query() {
        let (model, plugin) = plugin(
            &config(false, Some("dino")),
            vec![Ok(ModelMessage::text("It is noon."))],
        );

        let reply = plugin
            .handle(&ChatEvent::new(1, 1, "hey dino, what time is it?"))
            .await;

        assert_eq!(reply.as_deref(), Some("It is noon."));
        assert_eq!(
            model.requests()[0].messages.last().map(|m| m.content.as_str()),
            Some("what time is it?")
        );
    }

    #[tokio::test]
    async fn bare_trigger_gets_a_greeting() {
        let (model, plugin) = plugin(&config(true, Some("dino")), vec![]);
        assert_eq!(
            plugin.handle(&ChatEvent::new(1, 1, "Dino!")).await.as_deref(),
            Some(TRIGGER_GREETING)
        );
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn unaddressed_messages_are_ignored() {
        let (_, with_trigger) = plugin(&config(true, Some("dino")), vec![]);
        assert_eq!(with_trigger.handle(&ChatEvent::new(1, 1, "good morning")).await, None);

        let (_, without_trigger) = plugin(&config(true, None), vec![]);
        assert_eq!(without_trigger.handle(&ChatEvent::new(1, 1, "dino hi")).await, None);
    }

    #[tokio::test]
    async fn missing_identity_is_reported() {
        let (model, plugin) = plugin(&config(true, None), vec![]);
        let event = ChatEvent {
            user_id: None,
            chat_id: Some(1),
            text: Some("/llm hello".to_string()),
            quoted_text: None,
        };
        assert_eq!(plugin.handle(&event).await.as_deref(), Some(MISSING_IDENTITY));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn simple_mode_passes_quoted_text() {
        let (model, plugin) = plugin(
            &config(false, None),
            vec![Ok(ModelMessage::text("A greeting."))],
        );

        let event = ChatEvent::new(1, 1, "/llm what is this?").quoting("hello world");
        assert_eq!(plugin.handle(&event).await.as_deref(), Some("A greeting."));
        assert!(matches!(plugin.mode(), Mode::Simple(_)));
        assert_eq!(
            model.requests()[0].messages.last().map(|m| m.content.as_str()),
            Some("what is this?\n\nQuoted message:\nhello world")
        );
    }

    #[tokio::test]
    async fn missing_text_depends_on_mode() {
        let event = ChatEvent {
            user_id: Some(1),
            chat_id: Some(1),
            ..Default::default()
        };
        let (_, assistant) = plugin(&config(true, None), vec![]);
        assert_eq!(assistant.handle(&event).await.as_deref(), Some(HELP_TEXT));
        let (_, simple) = plugin(&config(false, None), vec![]);
        assert_eq!(simple.handle(&event).await.as_deref(), Some(MESSAGE_UNAVAILABLE));
    }
}
