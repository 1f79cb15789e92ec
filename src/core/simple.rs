//! Tool-less chat: a fixed role prompt, recent history and the query.

use std::sync::Arc;

use tracing::{debug, error};

use crate::api::completion::{ModelClient, ModelRequest};
use crate::api::ChatMessage;
use crate::core::config::defaults::SIMPLE_LLM_ROLE;
use crate::core::history::ConversationStore;
use crate::core::AssistantError;

pub struct SimpleChat {
    model: Arc<dyn ModelClient>,
    store: Arc<ConversationStore>,
    model_name: String,
    api_key: Option<String>,
}

impl SimpleChat {
    pub fn new(
        model: Arc<dyn ModelClient>,
        store: Arc<ConversationStore>,
        model_name: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            model,
            store,
            model_name: model_name.into(),
            api_key,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Answers `query`, optionally with the message it replies to. Failures
    /// are reported as `LLM error: ...` and leave the history untouched.
    pub async fn process(
        &self,
        user_id: i64,
        chat_id: i64,
        query: &str,
        quoted: Option<&str>,
    ) -> String {
        match self.answer(user_id, chat_id, query, quoted).await {
            Ok(answer) => answer,
            Err(err) => {
                error!(user_id, chat_id, error = %err, "Simple chat failed");
                format!("LLM error: {err}")
            }
        }
    }

    async fn answer(
        &self,
        user_id: i64,
        chat_id: i64,
        query: &str,
        quoted: Option<&str>,
    ) -> Result<String, AssistantError> {
        let mut messages = vec![ChatMessage::system(SIMPLE_LLM_ROLE)];
        messages.extend(self.store.history_messages(user_id, chat_id)?);

        let content = match quoted.map(str::trim).filter(|text| !text.is_empty()) {
            Some(quoted) => format!("{query}\n\nQuoted message:\n{quoted}"),
            None => query.to_string(),
        };
        messages.push(ChatMessage::user(content));

        debug!(user_id, chat_id, messages = messages.len(), "Requesting simple completion");
        let reply = self
            .model
            .complete(ModelRequest {
                model: self.model_name.clone(),
                api_key: self.api_key.clone(),
                messages,
                tools: None,
            })
            .await?;
        let answer = reply.content.unwrap_or_default();

        self.store.save_exchange(user_id, chat_id, query, &answer)?;
        Ok(answer)
    }
}
