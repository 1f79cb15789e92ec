//! One-shot queries through the same entry point a chat bot uses.

use std::error::Error;

use crate::core::config::Config;
use crate::core::plugin::{AssistantPlugin, ChatEvent};
use crate::core::query::COMMAND_PREFIX;

pub async fn run_ask(
    config: &Config,
    user: i64,
    chat: i64,
    prompt: Vec<String>,
    quote: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: lotb ask <prompt>");
        std::process::exit(1);
    }

    let mut event = ChatEvent::new(user, chat, command_text(&prompt));
    event.quoted_text = quote;
    reply(config, &event).await
}

/// Runs an assistant subcommand such as `tools` or `status`.
pub async fn run_command(
    config: &Config,
    user: i64,
    chat: i64,
    command: &str,
) -> Result<(), Box<dyn Error>> {
    if !config.assistant_mode {
        eprintln!("⚠️  '{command}' needs assistant_mode = true in the configuration");
        std::process::exit(1);
    }
    reply(config, &ChatEvent::new(user, chat, command_text(command))).await
}

async fn reply(config: &Config, event: &ChatEvent) -> Result<(), Box<dyn Error>> {
    let plugin = AssistantPlugin::from_config(config)?;
    match plugin.handle(event).await {
        Some(answer) => println!("{answer}"),
        None => eprintln!("(no reply)"),
    }
    Ok(())
}

pub fn command_text(query: &str) -> String {
    format!("{COMMAND_PREFIX} {query}")
}
