//! Model Context Protocol client over streamable HTTP.
//!
//! Every JSON-RPC message is POSTed to `{base_url}/mcp`. The server assigns a
//! session id in the `mcp-session-id` response header during `initialize`;
//! later requests echo it back. Responses arrive as plain JSON or as an SSE
//! stream (see [`framing`]).
//!
//! ```text
//! McpClient (shared transport) ──session()──▶ McpSession (per request)
//!                                               ├─ initialize  (lazy, once)
//!                                               ├─ tools/list
//!                                               └─ tools/call
//! ```

pub mod framing;
pub mod session;
pub mod types;

pub use framing::{Frame, parse_frame};
pub use session::{McpClient, McpSession, McpSettings, SESSION_HEADER};
pub use types::{CallToolResult, McpTool};

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("MCP server returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("MCP response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("MCP response carried no JSON-RPC message")]
    MissingFrame,

    #[error("MCP tool `{tool}` failed: {message}")]
    ToolFailed { tool: String, message: String },
}
