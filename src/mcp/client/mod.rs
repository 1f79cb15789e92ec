//! Streamable HTTP implementation of [`CapabilitySession`].

use std::time::Duration;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::{CallToolRequestParams, ReadResourceRequestParams, RequestId};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::mcp::registry::CapabilityServer;
use crate::mcp::session::{
    CapabilitySession, RemoteResource, RemoteTool, ResourceContent, SessionFactory,
    ToolCallOutput,
};
use crate::mcp::transport::is_method_not_found;
use crate::mcp::transport::streamable_http::{
    is_event_stream_content_type, next_sse_server_message,
};
use crate::mcp::McpError;

mod protocol;

pub const MCP_MAX_TOOL_LIST: usize = 100;
const MCP_JSON_CONTENT_TYPE: &str = "application/json";
const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const MCP_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;

fn build_mcp_http_client(timeout: Duration) -> Result<reqwest::Client, McpError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(MCP_HTTP_CONNECT_TIMEOUT_SECONDS))
        .timeout(timeout)
        .build()?)
}

fn apply_streamable_http_client_post_headers(
    request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    request
        .header("Content-Type", MCP_JSON_CONTENT_TYPE)
        .header("Accept", MCP_JSON_AND_SSE_ACCEPT)
}

fn apply_streamable_http_protocol_version_header(
    request: reqwest::RequestBuilder,
    protocol_version: Option<&str>,
) -> reqwest::RequestBuilder {
    match protocol_version {
        Some(protocol_version) if !protocol_version.trim().is_empty() => {
            request.header(MCP_PROTOCOL_VERSION_HEADER, protocol_version)
        }
        _ => request,
    }
}

/// Opens initialized streamable HTTP sessions. One `reqwest::Client` is
/// shared so connections are pooled across sessions.
pub struct HttpSessionFactory {
    client: reqwest::Client,
}

impl HttpSessionFactory {
    pub fn new(timeout: Duration) -> Result<Self, McpError> {
        Ok(Self {
            client: build_mcp_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(
        &self,
        server: &CapabilityServer,
    ) -> Result<Box<dyn CapabilitySession>, McpError> {
        let endpoint = server
            .endpoint()
            .ok_or_else(|| McpError::MissingUrl(server.name.clone()))?;
        let mut session = HttpSession {
            client: self.client.clone(),
            server_name: server.name.clone(),
            endpoint,
            auth_header: server.auth_header(),
            session_id: None,
            protocol_version: None,
            next_request_id: 0,
        };
        session.initialize().await?;
        Ok(Box::new(session))
    }
}

pub struct HttpSession {
    client: reqwest::Client,
    server_name: String,
    endpoint: String,
    auth_header: Option<String>,
    session_id: Option<String>,
    protocol_version: Option<String>,
    next_request_id: i64,
}

impl HttpSession {
    async fn initialize(&mut self) -> Result<(), McpError> {
        let response = self
            .send_request(RequestFromClient::InitializeRequest(
                protocol::client_details(),
            ))
            .await?;
        let initialize = protocol::parse_initialize_result(response)?;
        debug!(
            server = %self.server_name,
            protocol_version = %initialize.protocol_version,
            session_id = self.session_id.as_deref().unwrap_or("<none>"),
            "Initialized MCP session"
        );
        self.protocol_version = Some(initialize.protocol_version);

        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await
    }

    fn post(&self, payload: String) -> reqwest::RequestBuilder {
        let mut request = apply_streamable_http_protocol_version_header(
            apply_streamable_http_client_post_headers(self.client.post(&self.endpoint)),
            self.protocol_version.as_deref(),
        )
        .body(payload);

        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }
        if let Some(session_id) = &self.session_id {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }
        request
    }

    fn remember_session_id(&mut self, response: &reqwest::Response) {
        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }
    }

    async fn send_request(&mut self, request: RequestFromClient) -> Result<ServerMessage, McpError> {
        self.next_request_id += 1;
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(RequestId::Integer(self.next_request_id)),
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;
        let payload = serde_json::to_string(&message)?;

        debug!(server = %self.server_name, url = %self.endpoint, "Sending MCP HTTP request");
        let response = self.post(payload).send().await?;
        if !response.status().is_success() {
            return Err(McpError::Status(response.status().as_u16()));
        }
        self.remember_session_id(&response);

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_event_stream_content_type(&content_type) {
            next_sse_server_message(response).await
        } else {
            let body = response.bytes().await?;
            Ok(serde_json::from_slice::<ServerMessage>(&body)?)
        }
    }

    async fn send_notification(
        &mut self,
        notification: NotificationFromClient,
    ) -> Result<(), McpError> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;
        let payload = serde_json::to_string(&message)?;

        let response = self.post(payload).send().await?;
        if !response.status().is_success() {
            return Err(McpError::Status(response.status().as_u16()));
        }
        self.remember_session_id(&response);
        Ok(())
    }

    async fn fetch_tools_page(
        &mut self,
        cursor: Option<String>,
    ) -> Result<Option<(Vec<RemoteTool>, Option<String>)>, McpError> {
        let response = self
            .send_request(RequestFromClient::ListToolsRequest(
                protocol::paginated_params(cursor),
            ))
            .await?;
        if is_method_not_found(&response) {
            return Ok(None);
        }
        protocol::parse_list_tools(response).map(Some)
    }
}

#[async_trait]
impl CapabilitySession for HttpSession {
    async fn list_tools(&mut self) -> Result<Vec<RemoteTool>, McpError> {
        let Some((mut tools, mut next_cursor)) = self.fetch_tools_page(None).await? else {
            return Ok(Vec::new());
        };

        while tools.len() < MCP_MAX_TOOL_LIST {
            let Some(cursor) = next_cursor.take() else {
                break;
            };
            match self.fetch_tools_page(Some(cursor)).await? {
                Some((page, cursor)) => {
                    tools.extend(page);
                    next_cursor = cursor;
                }
                None => break,
            }
        }

        if tools.len() > MCP_MAX_TOOL_LIST {
            warn!(
                server = %self.server_name,
                listed = tools.len(),
                kept = MCP_MAX_TOOL_LIST,
                "Truncating MCP tool listing"
            );
            tools.truncate(MCP_MAX_TOOL_LIST);
        }
        Ok(tools)
    }

    async fn list_resources(&mut self) -> Result<Vec<RemoteResource>, McpError> {
        let response = self
            .send_request(RequestFromClient::ListResourcesRequest(None))
            .await?;
        if is_method_not_found(&response) {
            return Ok(Vec::new());
        }
        protocol::parse_list_resources(response)
    }

    async fn read_resource(&mut self, uri: String) -> Result<Vec<ResourceContent>, McpError> {
        let params = ReadResourceRequestParams { meta: None, uri };
        let response = self
            .send_request(RequestFromClient::ReadResourceRequest(params))
            .await?;
        protocol::parse_read_resource(response)
    }

    async fn call_tool(
        &mut self,
        name: String,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallOutput, McpError> {
        debug!(server = %self.server_name, tool = %name, "Calling MCP tool");
        let params = CallToolRequestParams::new(&name).with_arguments(arguments);
        let response = self
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        protocol::parse_call_tool(response)
    }

    async fn close(&mut self) -> Result<(), McpError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };

        let mut request = self
            .client
            .delete(&self.endpoint)
            .header(MCP_SESSION_ID_HEADER, session_id);
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await?;
        let status = response.status();
        // 405 means the server does not support explicit termination.
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(McpError::Status(status.as_u16()))
        }
    }
}
