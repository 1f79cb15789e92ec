//! URL utilities for consistent URL handling
//!
//! Model endpoints and capability server endpoints are both built by joining
//! a configured base URL with a fixed path. These helpers keep the joins free
//! of double slashes.

const MCP_ENDPOINT_PATH: &str = "mcp";

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use lotb::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use lotb::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Resolve the streamable HTTP endpoint of a capability server.
///
/// Servers are configured with their root URL; the MCP endpoint lives under
/// `/mcp`. A URL that already points at `/mcp` is used as-is.
///
/// ```
/// use lotb::utils::url::mcp_endpoint;
///
/// assert_eq!(mcp_endpoint("http://tools.local:8080"), "http://tools.local:8080/mcp");
/// assert_eq!(mcp_endpoint("http://tools.local:8080/mcp/"), "http://tools.local:8080/mcp");
/// ```
pub fn mcp_endpoint(base_url: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if normalized.ends_with(&format!("/{MCP_ENDPOINT_PATH}")) {
        normalized
    } else {
        construct_api_url(&normalized, MCP_ENDPOINT_PATH)
    }
}
