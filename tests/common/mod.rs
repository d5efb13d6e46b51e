//! In-process mock backends shared by the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};

use maya_gateway::AppState;
use maya_gateway::config::{AppConfig, HistoryProvider};

pub const MOCK_SESSION_ID: &str = "mock-session-1";
pub const MOCK_REPLY: &str = "Tu balance actual es de $65,000.";

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// One JSON-RPC message received by the mock tool server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub session_id: Option<String>,
    pub body: Value,
}

#[derive(Debug, Default)]
struct McpShared {
    calls: Mutex<Vec<Recorded>>,
    /// Tools answered with an `isError` result.
    failing_tools: Vec<&'static str>,
    /// Answer the next `tools/call` with 404, as a server that lost the session.
    reject_next_call: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct MockMcp {
    pub url: String,
    shared: Arc<McpShared>,
}

impl MockMcp {
    pub fn calls(&self) -> Vec<Recorded> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn reject_next_call(&self) {
        self.shared.reject_next_call.store(true, Ordering::SeqCst);
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn tool_calls(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == "tools/call")
            .map(|c| c.body["params"].clone())
            .collect()
    }
}

fn tool_payload(name: &str, args: &Value) -> Option<Value> {
    match name {
        "get_company_balance" | "get_personal_balance" => Some(json!({
            "success": true,
            "data": { "ingresos": 150000.0, "gastos": 85000.0, "balance": 65000.0 }
        })),
        "analyze_expenses_by_category" => Some(json!({
            "success": true,
            "data": {
                "categorias": [{ "categoria": "Renta", "total": 40000.0, "transacciones": 1 }],
                "total_gastos": 40000.0
            }
        })),
        "generate_financial_plan" => Some(json!({
            "success": true,
            "plan": { "meta": "Ahorrar", "meses": 12 }
        })),
        "simulate_financial_scenario" => Some(json!({
            "success": true,
            "scenario": args,
        })),
        _ => None,
    }
}

/// Tool results are SSE framed, everything else is plain JSON.
async fn mcp_handler(
    State(shared): State<Arc<McpShared>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let method = body["method"].as_str().unwrap_or_default().to_string();
    shared.calls.lock().unwrap().push(Recorded {
        method: method.clone(),
        session_id: headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        body: body.clone(),
    });

    let Some(id) = body.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    match method.as_str() {
        "initialize" => (
            [("mcp-session-id", MOCK_SESSION_ID)],
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "mock-finance", "version": "0.0.1" }
                }
            })),
        )
            .into_response(),
        "tools/list" => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": [
                { "name": "get_company_balance", "description": "Balance", "inputSchema": { "type": "object" } },
                { "name": "get_personal_balance", "description": "Balance", "inputSchema": { "type": "object" } }
            ] }
        }))
        .into_response(),
        "tools/call" => {
            if shared.reject_next_call.swap(false, Ordering::SeqCst) {
                return (StatusCode::NOT_FOUND, "session not found").into_response();
            }
            let name = body["params"]["name"].as_str().unwrap_or_default();
            let failing = shared.failing_tools.contains(&name);
            let message = match tool_payload(name, &body["params"]["arguments"]) {
                Some(_) if failing => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{ "type": "text", "text": "backend unavailable" }],
                        "isError": true
                    }
                }),
                Some(payload) => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "content": [{ "type": "text", "text": payload.to_string() }] }
                }),
                None => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32602, "message": format!("Unknown tool: {name}") }
                }),
            };
            (
                [("content-type", "text/event-stream")],
                format!("event: message\ndata: {message}\n\n"),
            )
                .into_response()
        }
        _ => Json(json!({ "jsonrpc": "2.0", "id": id, "result": { "echo": method } }))
            .into_response(),
    }
}

pub async fn spawn_mcp() -> MockMcp {
    spawn_mcp_failing_tools(Vec::new()).await
}

/// Tool server whose listed tools answer with an `isError` result.
pub async fn spawn_mcp_failing_tools(failing_tools: Vec<&'static str>) -> MockMcp {
    let shared = Arc::new(McpShared {
        failing_tools,
        ..McpShared::default()
    });
    let app = Router::new()
        .route("/mcp", post(mcp_handler))
        .with_state(Arc::clone(&shared));
    let addr = serve(app).await;
    MockMcp {
        url: format!("http://{addr}"),
        shared,
    }
}

/// Tool server that rejects every request with the given status.
pub async fn spawn_failing_mcp(status: StatusCode) -> String {
    let app = Router::new().route("/mcp", post(move || async move { status }));
    format!("http://{}", serve(app).await)
}

#[derive(Debug, Clone, Copy)]
pub enum GenerationMode {
    Reply,
    Quota,
    Empty,
}

/// Credentials seen on one generation request.
#[derive(Debug, Clone)]
pub struct GenerationAuth {
    pub api_key_header: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockGeneration {
    pub url: String,
    requests: Arc<Mutex<Vec<(GenerationAuth, Value)>>>,
}

impl MockGeneration {
    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn auth(&self) -> Vec<GenerationAuth> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(auth, _)| auth.clone())
            .collect()
    }
}

pub async fn spawn_generation(mode: GenerationMode) -> MockGeneration {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);
    let app = Router::new().route(
        "/v1beta/models/{*rest}",
        post(move |headers: HeaderMap, RawQuery(query): RawQuery, Json(body): Json<Value>| {
            let recorded = Arc::clone(&recorded);
            async move {
                let auth = GenerationAuth {
                    api_key_header: headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(ToString::to_string),
                    query,
                };
                recorded.lock().unwrap().push((auth, body));
                match mode {
                    GenerationMode::Reply => Json(json!({
                        "candidates": [{
                            "content": { "role": "model", "parts": [{ "text": MOCK_REPLY }] },
                            "finishReason": "STOP"
                        }]
                    }))
                    .into_response(),
                    GenerationMode::Quota => (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({ "error": { "code": 429, "status": "RESOURCE_EXHAUSTED" } })),
                    )
                        .into_response(),
                    GenerationMode::Empty => Json(json!({ "candidates": [] })).into_response(),
                }
            }
        }),
    );
    let addr = serve(app).await;
    MockGeneration {
        url: format!("http://{addr}"),
        requests,
    }
}

/// Configuration pointing at the mocks, with rate limiting off.
pub fn test_config(mcp_url: &str, generation_url: &str) -> AppConfig {
    let mut config = AppConfig::load_from_args([
        "maya-gateway",
        "--mcp-url",
        mcp_url,
        "--generation-url",
        generation_url,
        "--rate-limit-enabled",
        "false",
    ])
    .unwrap();
    config.generation.provider = "gemini".to_string();
    config.generation.api_key = Some("test-key".to_string());
    config.mcp.timeout_secs = 5;
    config.generation.timeout_secs = 5;
    config.history.provider = HistoryProvider::Memory;
    config
}

pub async fn test_state(mcp_url: &str, generation_url: &str) -> AppState {
    AppState::from_config(test_config(mcp_url, generation_url))
        .await
        .unwrap()
}
