use futures_util::StreamExt;
use rust_mcp_schema::schema_utils::ServerMessage;

use crate::mcp::McpError;

/// Splits an SSE byte stream into trimmed, non-empty lines.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = memchr::memchr(b'\n', &self.buffer[start..]) {
            let newline = start + offset;
            push_trimmed(&mut lines, &self.buffer[start..newline]);
            start = newline + 1;
        }

        if flush {
            push_trimmed(&mut lines, &self.buffer[start..]);
            self.buffer.clear();
        } else if start > 0 {
            self.buffer.drain(..start);
        }

        lines
    }
}

fn push_trimmed(lines: &mut Vec<String>, bytes: &[u8]) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Reads an event stream until the first response or error message. Server
/// requests and notifications interleaved before it are skipped.
pub async fn next_sse_server_message(
    response: reqwest::Response,
) -> Result<ServerMessage, McpError> {
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(message) = first_reply(buffer.push(&chunk))? {
            return Ok(message);
        }
    }

    match first_reply(buffer.finish())? {
        Some(message) => Ok(message),
        None => Err(McpError::Protocol("empty event-stream response".to_string())),
    }
}

fn first_reply(lines: Vec<String>) -> Result<Option<ServerMessage>, McpError> {
    for line in lines {
        if let Some(message) = decode_sse_line(&line)? {
            if matches!(
                message,
                ServerMessage::Response(_) | ServerMessage::Error(_)
            ) {
                return Ok(Some(message));
            }
        }
    }
    Ok(None)
}

fn decode_sse_line(line: &str) -> Result<Option<ServerMessage>, McpError> {
    let Some(payload) = sse_data_payload(line) else {
        return Ok(None);
    };

    if payload.is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str::<ServerMessage>(payload)?))
}
