use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::auth::{UserInfo, UserProfile};
use crate::context::ToolOutcome;
use crate::dashboard::{FinancialDataQuery, FinancialSummary, financial_summary};
use crate::history::{ChatMessage, HistoryError};
use crate::llm::{ChatTurnRequest, Turn, TurnRole};
use crate::mcp::McpError;
use crate::plan::{PlanError, PlanRequest, generate_plan};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

impl From<HistoryError> for (StatusCode, Json<Value>) {
    fn from(err: HistoryError) -> Self {
        tracing::error!(name: "history.failed", error = %err, "History store error");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

/// Build the application router with all middleware applied.
pub fn build_router(state: AppState) -> Router {
    let resilience = &state.config.resilience;
    // Disabled means a timeout long enough to never fire, so the layer stack
    // keeps a single type.
    let timeout_duration = if resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(resilience.request_timeout_secs)
    };

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/chat", post(api_chat))
        .route("/api/financial-plan", post(api_financial_plan))
        .route("/api/financial-data", get(api_financial_data))
        .route("/api/mcp", post(api_mcp_proxy).delete(api_mcp_reset))
        .route("/api/auth/login", post(api_login))
        .route("/api/auth/logout", post(api_logout))
        .route("/api/history", axum::routing::delete(api_clear_all_history))
        .route(
            "/api/history/{user_id}",
            get(api_get_history)
                .put(api_put_history)
                .delete(api_delete_history),
        )
        .route("/api/history/{user_id}/size", get(api_history_size))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::rate_limit::rate_limit_middleware,
        ))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let config = Arc::clone(&state.config);
    info!(
        name: "server.config.loaded",
        mcp_url = %config.mcp.base_url,
        generation_url = %config.generation.base_url,
        model = %config.generation.model,
        history = ?config.history.provider,
        rate_limit = config.resilience.rate_limit_enabled,
        "Configuration loaded"
    );

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// A prior turn as the browser sends it.
///
/// Accepts both the stored message shape (`content`/`sender`) and the
/// `text`/`role` shape.
#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(alias = "text")]
    content: String,
    #[serde(alias = "role")]
    sender: String,
}

impl HistoryEntry {
    fn to_turn(&self) -> Turn {
        let role = if self.sender.eq_ignore_ascii_case("user") {
            TurnRole::User
        } else {
            TurnRole::Model
        };
        Turn::new(role, self.content.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    conversation_history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    user_info: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    success: bool,
    response: String,
    mcp_data: Vec<ToolOutcome>,
    mcp_tools: Vec<String>,
    raw_json: Value,
    timestamp: DateTime<Utc>,
}

/// POST /api/chat
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let message = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Mensaje requerido"))?
        .to_string();
    let profile = req.user_info.unwrap_or_default();
    let user_id = profile.id().map(ToString::to_string);

    let history = match (&req.conversation_history, &user_id) {
        (Some(entries), _) if !entries.is_empty() => {
            entries.iter().map(HistoryEntry::to_turn).collect()
        }
        (_, Some(id)) => state
            .history
            .load(id)
            .await?
            .iter()
            .map(ChatMessage::to_turn)
            .collect(),
        _ => Vec::new(),
    };

    let reply = state
        .orchestrator
        .respond(ChatTurnRequest {
            message: message.clone(),
            history,
            profile,
        })
        .await
        .map_err(|err| {
            let status = if err.is_quota() {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                StatusCode::BAD_GATEWAY
            };
            let message = err.user_message();
            (status, Json(json!({ "error": message, "response": message })))
        })?;

    if let Some(id) = &user_id {
        let exchange = [
            ChatMessage::user(message),
            ChatMessage::assistant(reply.response.clone(), Some(reply.raw_json.clone())),
        ];
        if let Err(err) = state
            .history
            .append(id, &exchange, state.config.history.max_messages)
            .await
        {
            tracing::warn!(name: "history.append.failed", user_id = %id, error = %err, "Could not store chat exchange");
        }
    }

    Ok(Json(ChatResponse {
        success: true,
        response: reply.response,
        mcp_data: reply.mcp_data,
        mcp_tools: reply.mcp_tools,
        raw_json: reply.raw_json,
        timestamp: Utc::now(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Plans and dashboard
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/financial-plan
async fn api_financial_plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> ApiResult<Value> {
    let session = state.orchestrator.mcp().session();
    match generate_plan(&session, &req).await {
        Ok(plan) => Ok(Json(json!({
            "success": true,
            "plan": plan,
            "timestamp": Utc::now(),
        }))),
        Err(PlanError::MissingGoal) => Err(api_error(
            StatusCode::BAD_REQUEST,
            PlanError::MissingGoal.to_string(),
        )),
        Err(err) => {
            tracing::error!(name: "plan.failed", error = %err, "Financial plan generation failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string(), "success": false })),
            ))
        }
    }
}

/// GET /api/financial-data
async fn api_financial_data(
    State(state): State<AppState>,
    Query(query): Query<FinancialDataQuery>,
) -> Json<FinancialSummary> {
    let session = state.orchestrator.mcp().session();
    Json(financial_summary(&session, &query).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON-RPC proxy
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProxyRequest {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// POST /api/mcp
async fn api_mcp_proxy(
    State(state): State<AppState>,
    Json(req): Json<ProxyRequest>,
) -> ApiResult<Value> {
    let method = req
        .method
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Método requerido"))?;

    match state.proxy.raw(method, req.params).await {
        Ok(data) => Ok(Json(json!({
            "success": true,
            "data": data,
            "sessionId": state.proxy.session_id().await,
        }))),
        Err(McpError::Status { status, .. }) => Err(api_error(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            format!("Error del servidor MCP: {status}"),
        )),
        Err(err) => {
            tracing::error!(name: "mcp.proxy.failed", method, error = %err, "Proxy request failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

/// DELETE /api/mcp
async fn api_mcp_reset(State(state): State<AppState>) -> Json<Value> {
    state.proxy.reset().await;
    Json(json!({ "success": true, "message": "Sesión reseteada" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth and history
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
}

/// POST /api/auth/login
async fn api_login(Json(req): Json<LoginRequest>) -> ApiResult<UserInfo> {
    let info =
        UserInfo::login(&req.username).map_err(|e| api_error(StatusCode::UNAUTHORIZED, e.to_string()))?;
    info!(name: "auth.login", user_id = %info.user_id, account_type = info.account_type.as_str(), "User logged in");
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    user_id: String,
}

/// POST /api/auth/logout
async fn api_logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> ApiResult<Value> {
    state.history.clear(req.user_id.trim()).await?;
    info!(name: "auth.logout", user_id = %req.user_id, "User logged out");
    Ok(Json(json!({ "success": true })))
}

async fn api_get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<ChatMessage>> {
    Ok(Json(state.history.load(&user_id).await?))
}

async fn api_put_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(messages): Json<Vec<ChatMessage>>,
) -> ApiResult<Value> {
    state.history.save(&user_id, &messages).await?;
    Ok(Json(json!({ "success": true })))
}

async fn api_delete_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Value> {
    state.history.clear(&user_id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn api_clear_all_history(State(state): State<AppState>) -> ApiResult<Value> {
    state.history.clear_all().await?;
    Ok(Json(json!({ "success": true })))
}

async fn api_history_size(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Value> {
    let size_kb = state.history.size_kb(&user_id).await?;
    Ok(Json(json!({ "userId": user_id, "sizeKb": size_kb })))
}
