use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use super::McpError;
use super::framing::parse_frame;
use super::types::{CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpTool};

pub const SESSION_HEADER: &str = "mcp-session-id";

/// Connection settings for the remote tool server.
#[derive(Debug, Clone)]
pub struct McpSettings {
    pub base_url: String,
    pub endpoint_path: String,
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
    pub timeout: Duration,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            endpoint_path: "/mcp".to_string(),
            protocol_version: "2024-11-05".to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP transport shared by every session.
#[derive(Clone)]
pub struct McpClient {
    http: reqwest::Client,
    settings: Arc<McpSettings>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("endpoint", &self.endpoint())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    pub fn new(settings: McpSettings) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(McpError::Transport)?;
        Ok(Self {
            http,
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &McpSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.endpoint_path
        )
    }

    /// A fresh, uninitialised session.
    pub fn session(&self) -> McpSession {
        McpSession {
            client: self.clone(),
            state: Mutex::new(SessionState::Uninitialized),
            next_id: AtomicU64::new(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Established { id: Option<String> },
}

/// One logical conversation with the tool server.
///
/// The handshake runs lazily on first use. Holding the state lock for the
/// whole handshake means concurrent callers wait for a single `initialize`.
#[derive(Debug)]
pub struct McpSession {
    client: McpClient,
    state: Mutex<SessionState>,
    next_id: AtomicU64,
}

struct Posted {
    session_id: Option<String>,
    payload: Option<Value>,
}

impl McpSession {
    pub async fn session_id(&self) -> Option<String> {
        match &*self.state.lock().await {
            SessionState::Established { id } => id.clone(),
            SessionState::Uninitialized => None,
        }
    }

    pub async fn is_established(&self) -> bool {
        matches!(&*self.state.lock().await, SessionState::Established { .. })
    }

    /// Forget the session; the next call performs a new handshake.
    pub async fn reset(&self) {
        *self.state.lock().await = SessionState::Uninitialized;
        self.next_id.store(1, Ordering::Relaxed);
    }

    async fn post(
        &self,
        body: &JsonRpcRequest<'_>,
        session_id: Option<&str>,
    ) -> Result<Posted, McpError> {
        let mut req = self
            .client
            .http
            .post(self.client.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = session_id {
            req = req.header(SESSION_HEADER, id);
        }

        let resp = req.send().await.map_err(McpError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let text = resp.text().await.map_err(McpError::Transport)?;
        let payload = if text.trim().is_empty() {
            None
        } else {
            Some(parse_frame(&text)?.into_payload())
        };

        Ok(Posted {
            session_id,
            payload,
        })
    }

    /// Perform the handshake if it has not happened yet.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let mut state = self.state.lock().await;
        if matches!(*state, SessionState::Established { .. }) {
            return Ok(());
        }

        let settings = self.client.settings();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let init = JsonRpcRequest::call(
            id,
            "initialize",
            json!({
                "protocolVersion": settings.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": settings.client_name,
                    "version": settings.client_version,
                }
            }),
        );

        let posted = self.post(&init, None).await?;
        decode_response(posted.payload)?;
        let session_id = posted.session_id;

        self.post(
            &JsonRpcRequest::notification("notifications/initialized"),
            session_id.as_deref(),
        )
        .await?;

        tracing::info!(
            name: "mcp.session.initialized",
            endpoint = %self.client.endpoint(),
            session_id = ?session_id,
            "MCP session established"
        );
        *state = SessionState::Established { id: session_id };
        Ok(())
    }

    /// Forward an arbitrary JSON-RPC method and return the whole response
    /// message. No handshake is performed; a session id in the response is
    /// remembered for later calls.
    pub async fn raw(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let current = self.session_id().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        };

        let posted = self.post(&body, current.as_deref()).await?;
        if let Some(new_id) = posted.session_id {
            *self.state.lock().await = SessionState::Established { id: Some(new_id) };
        }
        posted.payload.ok_or(McpError::MissingFrame)
    }

    /// Send a request inside an established session and return its `result`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        self.initialize().await?;
        let current = self.session_id().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let posted = match self
            .post(&JsonRpcRequest::call(id, method, params), current.as_deref())
            .await
        {
            Ok(posted) => posted,
            Err(err @ McpError::Status { .. }) => {
                if current.is_some() {
                    tracing::warn!(
                        name: "mcp.session.reset",
                        method,
                        error = %err,
                        "MCP session rejected; will re-initialize on next call"
                    );
                    self.reset().await;
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if let Some(new_id) = posted.session_id {
            *self.state.lock().await = SessionState::Established { id: Some(new_id) };
        }
        decode_response(posted.payload)
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.request("tools/list", params).await?;
            let parsed: ListToolsResult =
                serde_json::from_value(result).map_err(McpError::Decode)?;
            out.extend(parsed.tools);

            match parsed.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(out)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .request(
                "tools/call",
                json!({ "name": name, "arguments": Value::Object(args) }),
            )
            .await?;
        let parsed: CallToolResult = serde_json::from_value(result).map_err(McpError::Decode)?;

        if parsed.is_error {
            return Err(McpError::ToolFailed {
                tool: name.to_string(),
                message: parsed.first_text().unwrap_or("tool reported an error").to_string(),
            });
        }
        Ok(parsed)
    }

    /// Call a tool and return its decoded payload, or `None` on any failure.
    pub async fn invoke(&self, name: &str, args: Map<String, Value>) -> Option<Value> {
        let started = std::time::Instant::now();
        match self.call_tool(name, args).await {
            Ok(result) => {
                tracing::info!(
                    name: "mcp.tool.called",
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "MCP tool returned"
                );
                Some(result.into_payload())
            }
            Err(err) => {
                tracing::warn!(
                    name: "mcp.tool.failed",
                    tool = name,
                    error = %err,
                    "MCP tool call failed"
                );
                None
            }
        }
    }
}

fn decode_response(payload: Option<Value>) -> Result<Value, McpError> {
    let payload = payload.ok_or(McpError::MissingFrame)?;
    let resp: JsonRpcResponse = serde_json::from_value(payload).map_err(McpError::Decode)?;
    if let Some(err) = resp.error {
        return Err(McpError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    Ok(resp.result.unwrap_or(Value::Null))
}
