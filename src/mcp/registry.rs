use std::collections::HashMap;

use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::api::{ChatToolDefinition, ChatToolFunction};
use crate::core::prompt::capability_summary;
use crate::mcp::session::{RemoteResource, RemoteTool, SessionScope};
use crate::mcp::RESOURCE_TOOL_PREFIX;
use crate::utils::url::mcp_endpoint;

/// A configured remote capability server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityServer {
    pub name: String,
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

impl CapabilityServer {
    pub fn new(name: impl Into<String>, url: Option<String>, auth_token: Option<String>) -> Self {
        Self {
            name: name.into(),
            url,
            auth_token,
        }
    }

    /// The MCP endpoint, or `None` when no usable url is configured.
    pub fn endpoint(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(mcp_endpoint)
    }

    pub fn auth_header(&self) -> Option<String> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {token}"))
    }
}

/// A tool the model may call. Proxy tools carry the uri of the resource they
/// read instead of living on a server.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
    pub resource_uri: Option<String>,
}

impl Tool {
    pub fn is_resource_proxy(&self) -> bool {
        self.resource_uri.is_some()
    }

    pub fn for_resource(resource: &Resource) -> Self {
        Self {
            name: resource_tool_name(&resource.name),
            description: Some(format!(
                "read resource: {}",
                resource
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("access resource: {}", resource.uri))
            )),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
            resource_uri: Some(resource.uri.clone()),
        }
    }

    pub fn to_definition(&self) -> ChatToolDefinition {
        ChatToolDefinition {
            kind: "function".to_string(),
            function: ChatToolFunction {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

impl From<RemoteTool> for Tool {
    fn from(tool: RemoteTool) -> Self {
        Self {
            name: tool.name,
            description: tool.description,
            parameters: tool.input_schema,
            resource_uri: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

impl From<RemoteResource> for Resource {
    fn from(resource: RemoteResource) -> Self {
        let name = resource.name.unwrap_or_else(|| {
            resource
                .uri
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or("unknown")
                .to_string()
        });
        Self {
            uri: resource.uri,
            name,
            description: resource.description,
            mime_type: resource.mime_type,
        }
    }
}

/// `read_resource_<name>` with spaces, dashes and dots replaced by `_`.
pub fn resource_tool_name(resource_name: &str) -> String {
    let clean: String = resource_name
        .chars()
        .map(|ch| match ch {
            ' ' | '-' | '.' => '_',
            other => other,
        })
        .collect();
    format!("{RESOURCE_TOOL_PREFIX}{clean}")
}

/// Items gathered across servers, keyed for last-write-wins replacement.
/// `owners` maps each key to the index of the server that supplied it.
#[derive(Debug, Clone)]
pub struct LoadedItems<T> {
    pub items: Vec<T>,
    pub owners: HashMap<String, usize>,
}

impl<T> Default for LoadedItems<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            owners: HashMap::new(),
        }
    }
}

impl<T> LoadedItems<T> {
    fn insert(&mut self, key: String, item: T, server: usize, key_of: impl Fn(&T) -> &str) {
        if self.owners.insert(key.clone(), server).is_some() {
            if let Some(existing) = self.items.iter_mut().find(|existing| key_of(existing) == key) {
                *existing = item;
                return;
            }
        }
        self.items.push(item);
    }
}

/// Everything discovered by one load. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub tools: Vec<Tool>,
    pub resources: Vec<Resource>,
    pub tool_to_server: HashMap<String, usize>,
    pub resource_to_server: HashMap<String, usize>,
    pub summary: String,
}

pub struct CapabilityRegistry {
    servers: Vec<CapabilityServer>,
    sessions: SessionScope,
    loaded: OnceCell<CapabilitySet>,
}

impl CapabilityRegistry {
    /// Servers without a name, or repeating an earlier name, are skipped.
    pub fn new(servers: Vec<CapabilityServer>, sessions: SessionScope) -> Self {
        let mut accepted: Vec<CapabilityServer> = Vec::with_capacity(servers.len());
        for server in servers {
            if server.name.trim().is_empty() {
                warn!(url = server.url.as_deref().unwrap_or("<none>"), "Skipping capability server without a name");
                continue;
            }
            if accepted.iter().any(|existing| existing.name == server.name) {
                warn!(server = %server.name, "Skipping duplicate capability server");
                continue;
            }
            if server.endpoint().is_none() {
                warn!(server = %server.name, "Capability server has no url and will be unreachable");
            }
            accepted.push(server);
        }
        Self {
            servers: accepted,
            sessions,
            loaded: OnceCell::new(),
        }
    }

    pub fn servers(&self) -> &[CapabilityServer] {
        &self.servers
    }

    pub fn sessions(&self) -> &SessionScope {
        &self.sessions
    }

    /// Lists tools from every server in configured order. A failing server
    /// is logged and contributes nothing.
    pub async fn load_all_tools(&self) -> LoadedItems<Tool> {
        info!(servers = self.servers.len(), "Loading capability tools");
        let mut loaded = LoadedItems::default();

        for (index, server) in self.servers.iter().enumerate() {
            let tools = match self
                .sessions
                .run(server, "loading tools", |session| session.list_tools())
                .await
            {
                Ok(tools) => tools,
                Err(err) => {
                    warn!(server = %server.name, error = %err, "Failed to load tools");
                    continue;
                }
            };

            info!(
                server = %server.name,
                count = tools.len(),
                tools = ?tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>(),
                "Loaded tools"
            );
            for tool in tools {
                let tool = Tool::from(tool);
                if let Some(previous) = loaded.owners.get(&tool.name) {
                    warn!(
                        tool = %tool.name,
                        previous = %self.servers[*previous].name,
                        server = %server.name,
                        "Tool name offered by several servers; keeping the later one"
                    );
                }
                loaded.insert(tool.name.clone(), tool, index, |tool| tool.name.as_str());
            }
        }

        info!(tools = loaded.items.len(), mappings = loaded.owners.len(), "Finished loading tools");
        loaded
    }

    pub async fn load_all_resources(&self) -> LoadedItems<Resource> {
        info!(servers = self.servers.len(), "Loading capability resources");
        let mut loaded = LoadedItems::default();

        for (index, server) in self.servers.iter().enumerate() {
            let resources = match self
                .sessions
                .run(server, "loading resources", |session| session.list_resources())
                .await
            {
                Ok(resources) => resources,
                Err(err) => {
                    warn!(server = %server.name, error = %err, "Failed to load resources");
                    continue;
                }
            };

            info!(server = %server.name, count = resources.len(), "Loaded resources");
            for resource in resources {
                if resource.uri.trim().is_empty() {
                    debug!(server = %server.name, "Skipping resource without uri");
                    continue;
                }
                let resource = Resource::from(resource);
                if let Some(previous) = loaded.owners.get(&resource.uri) {
                    warn!(
                        uri = %resource.uri,
                        previous = %self.servers[*previous].name,
                        server = %server.name,
                        "Resource offered by several servers; keeping the later one"
                    );
                }
                loaded.insert(resource.uri.clone(), resource, index, |resource| {
                    resource.uri.as_str()
                });
            }
        }

        info!(resources = loaded.items.len(), mappings = loaded.owners.len(), "Finished loading resources");
        loaded
    }

    /// Loads tools and then resources exactly once. Concurrent callers wait
    /// for the first load.
    pub async fn ensure_loaded(&self) -> &CapabilitySet {
        self.loaded.get_or_init(|| self.load()).await
    }

    async fn load(&self) -> CapabilitySet {
        if self.servers.is_empty() {
            info!("No capability servers configured");
            return CapabilitySet {
                summary: capability_summary(&[], &[]),
                ..CapabilitySet::default()
            };
        }

        let tools = self.load_all_tools().await;
        let resources = self.load_all_resources().await;

        let mut all_tools = LoadedItems {
            items: tools.items,
            owners: tools.owners.clone(),
        };
        for resource in &resources.items {
            let proxy = Tool::for_resource(resource);
            if all_tools.owners.contains_key(&proxy.name) {
                warn!(tool = %proxy.name, uri = %resource.uri, "Resource tool name collides; keeping the later resource");
            }
            // proxies are never routed by server index
            all_tools.insert(proxy.name.clone(), proxy, 0, |tool| tool.name.as_str());
        }

        let summary = capability_summary(&all_tools.items, &resources.items);
        info!(
            tools = all_tools.items.len(),
            resources = resources.items.len(),
            "Capabilities loaded"
        );
        CapabilitySet {
            tools: all_tools.items,
            resources: resources.items,
            tool_to_server: tools.owners,
            resource_to_server: resources.owners,
            summary,
        }
    }

    fn loaded(&self) -> Option<&CapabilitySet> {
        self.loaded.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub fn tools(&self) -> &[Tool] {
        self.loaded().map_or(&[], |set| set.tools.as_slice())
    }

    pub fn resources(&self) -> &[Resource] {
        self.loaded().map_or(&[], |set| set.resources.as_slice())
    }

    pub fn capability_summary(&self) -> Option<&str> {
        self.loaded().map(|set| set.summary.as_str())
    }

    pub fn tool_mapping_count(&self) -> usize {
        self.loaded().map_or(0, |set| set.tool_to_server.len())
    }

    /// Tool definitions in the form the model expects.
    pub fn tool_definitions(&self) -> Vec<ChatToolDefinition> {
        self.tools().iter().map(Tool::to_definition).collect()
    }

    pub fn resolve_tool_server(&self, tool_name: &str) -> Option<&CapabilityServer> {
        self.loaded()?
            .tool_to_server
            .get(tool_name)
            .and_then(|index| self.servers.get(*index))
    }

    pub fn resolve_resource_uri_for_tool(&self, tool_name: &str) -> Option<&str> {
        self.tools()
            .iter()
            .find(|tool| tool.name == tool_name)
            .and_then(|tool| tool.resource_uri.as_deref())
    }

    pub fn resolve_resource_server(&self, uri: &str) -> Option<&CapabilityServer> {
        self.loaded()?
            .resource_to_server
            .get(uri)
            .and_then(|index| self.servers.get(*index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{registry_with, FakeServer, FakeSessionFactory};
    use std::sync::Arc;

    #[test]
    fn endpoint_appends_mcp_once() {
        let server = CapabilityServer::new("a", Some("http://host:1/".to_string()), None);
        assert_eq!(server.endpoint().as_deref(), Some("http://host:1/mcp"));
        let server = CapabilityServer::new("a", Some("http://host:1/mcp".to_string()), None);
        assert_eq!(server.endpoint().as_deref(), Some("http://host:1/mcp"));
        let server = CapabilityServer::new("a", Some("  ".to_string()), None);
        assert_eq!(server.endpoint(), None);
    }

    #[test]
    fn auth_header_uses_bearer_scheme() {
        let server = CapabilityServer::new("a", None, Some("secret".to_string()));
        assert_eq!(server.auth_header().as_deref(), Some("Bearer secret"));
        assert_eq!(CapabilityServer::new("a", None, None).auth_header(), None);
    }

    #[test]
    fn resource_tool_names_are_sanitized() {
        assert_eq!(resource_tool_name("History.txt"), "read_resource_History_txt");
        assert_eq!(resource_tool_name("my notes-v2"), "read_resource_my_notes_v2");
    }

    #[test]
    fn nameless_resources_use_last_uri_segment() {
        let resource = Resource::from(RemoteResource {
            uri: "file:///data/report.csv".to_string(),
            name: None,
            description: None,
            mime_type: None,
        });
        assert_eq!(resource.name, "report.csv");

        let proxy = Tool::for_resource(&resource);
        assert_eq!(proxy.name, "read_resource_report_csv");
        assert_eq!(
            proxy.description.as_deref(),
            Some("read resource: access resource: file:///data/report.csv")
        );
        assert_eq!(
            proxy.parameters,
            json!({"type": "object", "properties": {}, "required": []})
        );
        assert!(proxy.is_resource_proxy());
    }

    #[tokio::test]
    async fn loads_tools_and_synthesizes_resource_tools() {
        let registry = registry_with(vec![FakeServer::new("A")
            .with_tool("get_data", "fetch data", "data")
            .with_resource("file:///h.txt", Some("History.txt"), Some("history"), "hello")]);

        let set = registry.ensure_loaded().await;

        let names: Vec<_> = set.tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["get_data", "read_resource_History_txt"]);
        assert_eq!(
            registry.resolve_tool_server("get_data").map(|s| s.name.as_str()),
            Some("A")
        );
        assert_eq!(
            registry.resolve_resource_uri_for_tool("read_resource_History_txt"),
            Some("file:///h.txt")
        );
        assert_eq!(
            registry
                .resolve_resource_server("file:///h.txt")
                .map(|s| s.name.as_str()),
            Some("A")
        );
        assert!(set.summary.contains("TOOLS:\n  • get_data: fetch data"));
        assert!(set.summary.contains("RESOURCES:\n  • History.txt: history"));
    }

    #[tokio::test]
    async fn failing_server_contributes_nothing() {
        let registry = registry_with(vec![
            FakeServer::new("down").down(),
            FakeServer::new("up").with_tool("get_time", "clock", "noon"),
        ]);

        let tools = registry.load_all_tools().await;
        assert_eq!(tools.items.len(), 1);
        assert_eq!(tools.owners.get("get_time"), Some(&1));
        assert!(registry.load_all_resources().await.items.is_empty());
    }

    #[tokio::test]
    async fn later_server_wins_tool_name_collisions() {
        let registry = registry_with(vec![
            FakeServer::new("first").with_tool("search", "old", "a"),
            FakeServer::new("second").with_tool("search", "new", "b"),
        ]);

        registry.ensure_loaded().await;

        assert_eq!(registry.tools().len(), 1);
        assert_eq!(registry.tools()[0].description.as_deref(), Some("new"));
        assert_eq!(
            registry.resolve_tool_server("search").map(|s| s.name.as_str()),
            Some("second")
        );
    }

    #[tokio::test]
    async fn ensure_loaded_lists_each_server_once() {
        let factory = Arc::new(FakeSessionFactory::new(vec![
            FakeServer::new("A").with_tool("get_data", "d", "x")
        ]));
        let registry = CapabilityRegistry::new(
            factory.servers(),
            SessionScope::new(factory.clone(), std::time::Duration::from_secs(5)),
        );

        assert!(!registry.is_loaded());
        registry.ensure_loaded().await;
        registry.ensure_loaded().await;

        assert!(registry.is_loaded());
        // one session for tools, one for resources
        assert_eq!(factory.opened("A"), 2);
        assert_eq!(factory.closed("A"), 2);
    }

    #[tokio::test]
    async fn no_servers_caches_empty_set() {
        let registry = registry_with(Vec::new());
        let set = registry.ensure_loaded().await;
        assert!(set.tools.is_empty());
        assert_eq!(set.summary, "no capabilities available at the moment");
        assert_eq!(registry.resolve_tool_server("anything"), None);
    }

    #[test]
    fn nameless_and_duplicate_servers_are_skipped() {
        let factory = Arc::new(FakeSessionFactory::new(Vec::new()));
        let registry = CapabilityRegistry::new(
            vec![
                CapabilityServer::new("", Some("http://a".to_string()), None),
                CapabilityServer::new("one", Some("http://b".to_string()), None),
                CapabilityServer::new("one", Some("http://c".to_string()), None),
            ],
            SessionScope::new(factory, std::time::Duration::from_secs(5)),
        );
        assert_eq!(registry.servers().len(), 1);
        assert_eq!(registry.servers()[0].url.as_deref(), Some("http://b"));
    }
}
