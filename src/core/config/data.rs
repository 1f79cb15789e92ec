use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mcp::registry::CapabilityServer;

/// One remote capability server entry.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CapabilityServerConfig {
    pub name: Option<String>,
    pub url: Option<String>,
    /// Bearer token sent with every request to this server.
    #[serde(alias = "auth_value")]
    pub auth_token: Option<String>,
}

impl CapabilityServerConfig {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("unknown")
    }
}

impl From<&CapabilityServerConfig> for CapabilityServer {
    fn from(config: &CapabilityServerConfig) -> Self {
        CapabilityServer::new(
            config.name.clone().unwrap_or_default(),
            config.url.clone(),
            config.auth_token.clone(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Model identifier passed to the completion endpoint (e.g., "gpt-4.1-nano")
    pub model: Option<String>,
    #[serde(alias = "apikey")]
    pub api_key: Option<String>,
    /// OpenAI-compatible API root; `chat/completions` is appended
    pub base_url: Option<String>,
    /// Stored turns kept per (user, chat)
    #[serde(alias = "maxhistory")]
    pub max_history: Option<usize>,
    /// Route queries through the tool-calling loop instead of plain chat
    #[serde(default)]
    pub assistant_mode: bool,
    /// Name that triggers the bot without the command prefix (e.g., "hey dino")
    #[serde(alias = "friendlyname")]
    pub trigger_name: Option<String>,
    /// Replaces the default assistant template. May contain
    /// `{capabilities_summary}`.
    pub system_prompt: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// SQLite file holding conversation history
    pub database: Option<PathBuf>,
    #[serde(default, alias = "mcpservers")]
    pub capability_servers: Vec<CapabilityServerConfig>,
}

impl Config {
    pub fn capability_servers(&self) -> Vec<CapabilityServer> {
        self.capability_servers
            .iter()
            .map(CapabilityServer::from)
            .collect()
    }

    /// Configuration problems worth warning about. None of them are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if is_blank(self.api_key.as_deref()) {
            warnings.push("missing api key in configuration".to_string());
        }
        if is_blank(self.model.as_deref()) {
            warnings.push("missing model in configuration".to_string());
        }

        if self.assistant_mode {
            if self.capability_servers.is_empty() {
                warnings.push("assistant mode enabled but no MCP servers configured".to_string());
            }
            let mut seen: Vec<&str> = Vec::new();
            for server in &self.capability_servers {
                if is_blank(server.name.as_deref()) {
                    warnings.push("MCP server missing name field".to_string());
                } else if let Some(name) = server.name.as_deref() {
                    if seen.contains(&name) {
                        warnings.push(format!("MCP server '{name}' is configured more than once"));
                    }
                    seen.push(name);
                }
                if is_blank(server.url.as_deref()) {
                    warnings.push(format!(
                        "MCP server '{}' missing url field",
                        server.display_name()
                    ));
                }
            }
        }

        warnings
    }

    /// One-line summary logged at startup.
    pub fn info(&self) -> String {
        let mode = if self.assistant_mode {
            "assistant"
        } else {
            "simple"
        };
        let server_count = if self.assistant_mode {
            self.capability_servers.len()
        } else {
            0
        };
        let trigger = self
            .trigger_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| format!(" (trigger: {name})"))
            .unwrap_or_default();
        format!(
            "llm assistant initialized in {mode} mode with {} message memory{trigger}, {server_count} MCP servers",
            self.effective_max_history()
        )
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.trim().is_empty())
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
