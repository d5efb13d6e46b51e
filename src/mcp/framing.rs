//! Response framing.
//!
//! The backend answers a POST either with a plain JSON body or with a
//! server-sent-events stream whose first `data:` line carries the JSON-RPC
//! message. Both decode to the same payload.

use serde_json::Value;

use super::McpError;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Json(Value),
    Sse { event: Option<String>, data: Value },
}

impl Frame {
    pub fn into_payload(self) -> Value {
        match self {
            Self::Json(v) | Self::Sse { data: v, .. } => v,
        }
    }
}

/// Decode a response body in either framing.
pub fn parse_frame(body: &str) -> Result<Frame, McpError> {
    let trimmed = body.trim_start();

    if !trimmed.starts_with("event:") {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(Frame::Json(value));
        }
    }

    let mut event = None;
    for line in trimmed.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = serde_json::from_str(data.trim()).map_err(McpError::Decode)?;
            return Ok(Frame::Sse { event, data });
        }
    }

    // Neither a JSON document nor an SSE stream with data.
    if trimmed.starts_with("event:") || trimmed.contains("\ndata:") {
        return Err(McpError::MissingFrame);
    }
    serde_json::from_str(trimmed)
        .map(Frame::Json)
        .map_err(McpError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_and_sse_yield_same_payload() {
        let json_body = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;
        let sse_body =
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n";

        let a = parse_frame(json_body).unwrap();
        let b = parse_frame(sse_body).unwrap();
        assert!(matches!(a, Frame::Json(_)));
        assert!(matches!(&b, Frame::Sse { event: Some(e), .. } if e == "message"));
        assert_eq!(a.into_payload(), b.into_payload());
    }

    #[test]
    fn test_sse_without_event_line() {
        let frame = parse_frame("data: {\"id\":2}\n\n").unwrap();
        assert_eq!(frame.into_payload(), json!({ "id": 2 }));
    }

    #[test]
    fn test_sse_without_data_is_missing_frame() {
        assert!(matches!(
            parse_frame("event: message\n\n"),
            Err(McpError::MissingFrame)
        ));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(parse_frame("<html>"), Err(McpError::Decode(_))));
    }
}
