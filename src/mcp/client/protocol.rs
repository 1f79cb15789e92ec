use rust_mcp_schema::schema_utils::ServerMessage;
use rust_mcp_schema::{
    ClientCapabilities, Implementation, InitializeRequestParams, InitializeResult,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, RpcError,
    LATEST_PROTOCOL_VERSION,
};
use serde_json::Value;

use crate::mcp::session::{
    RemoteResource, RemoteTool, ResourceContent, ToolCallOutput, ToolContent,
};
use crate::mcp::McpError;

pub(crate) fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "lotb".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("lotb assistant".to_string()),
            description: Some("lotb capability client".to_string()),
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

pub(crate) fn paginated_params(cursor: Option<String>) -> Option<PaginatedRequestParams> {
    cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    })
}

pub(crate) fn parse_initialize_result(message: ServerMessage) -> Result<InitializeResult, McpError> {
    let result: InitializeResult = parse_response(message)?;
    if result.protocol_version.trim().is_empty() {
        return Err(McpError::Protocol(
            "initialize response carries no protocol version".to_string(),
        ));
    }
    Ok(result)
}

/// One page of a tool listing plus the cursor of the next page.
pub(crate) fn parse_list_tools(
    message: ServerMessage,
) -> Result<(Vec<RemoteTool>, Option<String>), McpError> {
    let list: ListToolsResult = parse_response(message)?;
    let tools = list
        .tools
        .into_iter()
        .map(|tool| -> Result<RemoteTool, McpError> {
            Ok(RemoteTool {
                input_schema: serde_json::to_value(&tool.input_schema)?,
                name: tool.name,
                description: tool.description,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((tools, list.next_cursor))
}

pub(crate) fn parse_list_resources(message: ServerMessage) -> Result<Vec<RemoteResource>, McpError> {
    let list: ListResourcesResult = parse_response(message)?;
    Ok(list
        .resources
        .into_iter()
        .map(|resource| RemoteResource {
            name: Some(resource.name).filter(|name| !name.trim().is_empty()),
            uri: resource.uri,
            description: resource.description,
            mime_type: resource.mime_type,
        })
        .collect())
}

pub(crate) fn parse_read_resource(message: ServerMessage) -> Result<Vec<ResourceContent>, McpError> {
    let value = parse_response_value(message)?;
    Ok(read_resource_contents(&value))
}

pub(crate) fn parse_call_tool(message: ServerMessage) -> Result<ToolCallOutput, McpError> {
    let value = parse_response_value(message)?;
    Ok(call_tool_output(&value))
}

fn read_resource_contents(value: &Value) -> Vec<ResourceContent> {
    value
        .get("contents")
        .and_then(Value::as_array)
        .map(|contents| {
            contents
                .iter()
                .map(|content| match content.get("text").and_then(Value::as_str) {
                    Some(text) => ResourceContent::Text(text.to_string()),
                    None if content.get("blob").is_some() => ResourceContent::Blob {
                        mime_type: content
                            .get("mimeType")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                    None => ResourceContent::Text(content.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn call_tool_output(value: &Value) -> ToolCallOutput {
    let content = value
        .get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    match (
                        part.get("type").and_then(Value::as_str),
                        part.get("text").and_then(Value::as_str),
                    ) {
                        (Some("text"), Some(text)) => ToolContent::Text(text.to_string()),
                        _ => ToolContent::Other(part.clone()),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    ToolCallOutput { content, is_error }
}

fn parse_response<T: serde::de::DeserializeOwned>(message: ServerMessage) -> Result<T, McpError> {
    let value = parse_response_value(message)?;
    Ok(serde_json::from_value::<T>(value)?)
}

pub(crate) fn parse_response_value(message: ServerMessage) -> Result<Value, McpError> {
    match message {
        ServerMessage::Response(response) => Ok(serde_json::to_value(&response.result)?),
        ServerMessage::Error(error) => Err(McpError::Rpc(format_rpc_error(&error.error))),
        other => Err(McpError::Protocol(format!("{other:?}"))),
    }
}

pub(crate) fn format_rpc_error(error: &RpcError) -> String {
    let mut output = format!("MCP error {}: {}", error.code, error.message);
    let details = error.data.as_ref().and_then(|data| {
        data.get("details")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| data.as_str().map(str::to_string))
    });
    if let Some(details) = details.filter(|details| !details.is_empty()) {
        output.push_str(": ");
        output.push_str(&details);
    }
    output
}
