use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn call(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params: Some(params),
        }
    }

    pub fn notification(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    #[serde(rename = "structuredContent", default)]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// First `{"type": "text"}` part.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| {
            (part.get("type").and_then(Value::as_str) == Some("text"))
                .then(|| part.get("text").and_then(Value::as_str))
                .flatten()
        })
    }

    /// Collapse the result into one JSON value.
    ///
    /// Structured content wins; otherwise the first text part is parsed as
    /// JSON, falling back to the text itself. With neither, the raw content
    /// array is returned.
    pub fn into_payload(self) -> Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let Some(text) = self.first_text() {
            return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
        }
        Value::Array(self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_json_is_decoded() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "{\"success\":true,\"data\":{\"balance\":10}}" }]
        }))
        .unwrap();
        assert_eq!(
            result.into_payload(),
            json!({ "success": true, "data": { "balance": 10 } })
        );
    }

    #[test]
    fn test_structured_content_wins() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "ignored" }],
            "structuredContent": { "ok": 1 }
        }))
        .unwrap();
        assert_eq!(result.into_payload(), json!({ "ok": 1 }));
    }

    #[test]
    fn test_plain_text_is_kept() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "sin datos" }]
        }))
        .unwrap();
        assert_eq!(result.into_payload(), json!("sin datos"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let body = serde_json::to_value(JsonRpcRequest::notification("notifications/initialized"))
            .unwrap();
        assert_eq!(
            body,
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
        );
    }
}
