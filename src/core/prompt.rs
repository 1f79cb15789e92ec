use crate::mcp::registry::{Resource, Tool};

const CAPABILITIES_PLACEHOLDER: &str = "{capabilities_summary}";

/// Summary shown before the registry has finished loading.
pub const LOADING_CAPABILITIES: &str = "loading capabilities...";
pub const NO_CAPABILITIES: &str = "no capabilities available at the moment";

/// Renders the assistant system prompt from a template with a single
/// `{capabilities_summary}` placeholder.
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    template: String,
    capabilities: String,
}

impl SystemPromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            capabilities: String::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: impl Into<String>) -> Self {
        self.capabilities = capabilities.into();
        self
    }

    pub fn build(&self) -> String {
        self.template
            .replace(CAPABILITIES_PLACEHOLDER, &self.capabilities)
    }
}

/// Human-readable list of real tools and resources. Resource proxy tools
/// are left out since the resources are listed on their own.
pub fn capability_summary(tools: &[Tool], resources: &[Resource]) -> String {
    let mut sections = Vec::new();

    let tool_lines: Vec<String> = tools
        .iter()
        .filter(|tool| !tool.is_resource_proxy())
        .map(|tool| format!("  • {}: {}", tool.name, tool.description.as_deref().unwrap_or("")))
        .collect();
    if !tool_lines.is_empty() {
        sections.push(format!("TOOLS:\n{}", tool_lines.join("\n")));
    }

    if !resources.is_empty() {
        let resource_lines: Vec<String> = resources
            .iter()
            .map(|resource| {
                format!(
                    "  • {}: {}",
                    resource.name,
                    resource.description.as_deref().unwrap_or("")
                )
            })
            .collect();
        sections.push(format!("RESOURCES:\n{}", resource_lines.join("\n")));
    }

    if sections.is_empty() {
        NO_CAPABILITIES.to_string()
    } else {
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, description: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: json!({"type": "object"}),
            resource_uri: None,
        }
    }

    fn resource(name: &str, description: &str) -> Resource {
        Resource {
            uri: format!("file:///{name}"),
            name: name.to_string(),
            description: Some(description.to_string()),
            mime_type: None,
        }
    }

    #[test]
    fn builder_fills_placeholder() {
        let prompt = SystemPromptBuilder::new("caps:\n{capabilities_summary}\nend")
            .with_capabilities("TOOLS:\n  • a: b")
            .build();
        assert_eq!(prompt, "caps:\nTOOLS:\n  • a: b\nend");
    }

    #[test]
    fn template_without_placeholder_is_unchanged() {
        let prompt = SystemPromptBuilder::new("plain")
            .with_capabilities("ignored")
            .build();
        assert_eq!(prompt, "plain");
    }

    #[test]
    fn summary_lists_tools_and_resources() {
        let mut proxy = tool("read_resource_notes", "read resource: notes");
        proxy.resource_uri = Some("file:///notes".to_string());
        let summary = capability_summary(
            &[tool("get_weather", "current weather"), proxy],
            &[resource("notes", "my notes")],
        );
        assert_eq!(
            summary,
            "TOOLS:\n  • get_weather: current weather\n\nRESOURCES:\n  • notes: my notes"
        );
    }

    #[test]
    fn summary_with_only_resources_skips_tool_section() {
        let summary = capability_summary(&[], &[resource("notes", "n")]);
        assert_eq!(summary, "RESOURCES:\n  • notes: n");
    }

    #[test]
    fn empty_summary_says_so() {
        assert_eq!(capability_summary(&[], &[]), NO_CAPABILITIES);
    }
}
