mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{Map, json};

use common::{MOCK_SESSION_ID, spawn_failing_mcp, spawn_mcp};
use maya_gateway::mcp::{McpClient, McpError, McpSettings};

fn client(base_url: &str) -> McpClient {
    McpClient::new(McpSettings {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        ..McpSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_handshake_runs_once_and_echoes_session() {
    let mock = spawn_mcp().await;
    let session = client(&mock.url).session();
    assert!(!session.is_established().await);

    let mut args = Map::new();
    args.insert("company_id".into(), json!("E001"));
    let first = session.invoke("get_company_balance", args.clone()).await;
    let second = session.invoke("get_company_balance", args).await;

    assert_eq!(first, second);
    assert_eq!(first.unwrap()["data"]["balance"], 65000.0);
    assert_eq!(session.session_id().await.as_deref(), Some(MOCK_SESSION_ID));

    assert_eq!(
        mock.methods(),
        vec!["initialize", "notifications/initialized", "tools/call", "tools/call"]
    );
    let calls = mock.calls();
    assert_eq!(calls[0].session_id, None);
    assert_eq!(calls[0].body["params"]["protocolVersion"], "2024-11-05");
    assert!(calls[1].body.get("id").is_none());
    assert!(
        calls[1..]
            .iter()
            .all(|c| c.session_id.as_deref() == Some(MOCK_SESSION_ID))
    );
    assert_eq!(mock.tool_calls()[0]["arguments"]["company_id"], "E001");
}

#[tokio::test]
async fn test_list_tools() {
    let mock = spawn_mcp().await;
    let tools = client(&mock.url).session().list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["get_company_balance", "get_personal_balance"]);
}

#[tokio::test]
async fn test_unknown_tool_is_rpc_error() {
    let mock = spawn_mcp().await;
    let session = client(&mock.url).session();

    let err = session
        .call_tool("no_such_tool", Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::Rpc { code: -32602, .. }));
    assert_eq!(session.invoke("no_such_tool", Map::new()).await, None);
}

#[tokio::test]
async fn test_invoke_returns_none_when_unreachable() {
    let session = client("http://127.0.0.1:9").session();
    assert_eq!(session.invoke("get_company_balance", Map::new()).await, None);
    assert!(!session.is_established().await);
}

#[tokio::test]
async fn test_http_status_surfaces() {
    let url = spawn_failing_mcp(StatusCode::SERVICE_UNAVAILABLE).await;
    let session = client(&url).session();

    let err = session.raw("tools/list", None).await.unwrap_err();
    assert!(matches!(err, McpError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_raw_skips_handshake_and_reset_forgets_session() {
    let mock = spawn_mcp().await;
    let session = client(&mock.url).session();

    let message = session
        .raw("initialize", Some(json!({ "protocolVersion": "2024-11-05" })))
        .await
        .unwrap();
    assert_eq!(message["result"]["serverInfo"]["name"], "mock-finance");
    assert_eq!(session.session_id().await.as_deref(), Some(MOCK_SESSION_ID));

    let echoed = session.raw("ping", None).await.unwrap();
    assert_eq!(echoed["result"]["echo"], "ping");
    assert_eq!(mock.methods(), vec!["initialize", "ping"]);
    assert_eq!(mock.calls()[1].session_id.as_deref(), Some(MOCK_SESSION_ID));

    session.reset().await;
    assert_eq!(session.session_id().await, None);
}

#[tokio::test]
async fn test_rejected_session_handshakes_again() {
    let mock = spawn_mcp().await;
    let session = client(&mock.url).session();
    session.initialize().await.unwrap();

    mock.reject_next_call();
    assert_eq!(session.invoke("get_company_balance", Map::new()).await, None);
    assert!(!session.is_established().await);

    let again = session.invoke("get_company_balance", Map::new()).await;
    assert_eq!(again.unwrap()["data"]["balance"], 65000.0);
    assert!(session.is_established().await);
    assert_eq!(
        mock.methods(),
        vec![
            "initialize",
            "notifications/initialized",
            "tools/call",
            "initialize",
            "notifications/initialized",
            "tools/call",
        ]
    );
}

#[tokio::test]
async fn test_concurrent_callers_share_one_handshake() {
    let mock = spawn_mcp().await;
    let session = client(&mock.url).session();

    let (a, b, c) = tokio::join!(
        session.list_tools(),
        session.list_tools(),
        session.invoke("get_personal_balance", Map::new()),
    );
    assert_eq!(a.unwrap().len(), 2);
    assert_eq!(b.unwrap().len(), 2);
    assert!(c.is_some());

    let methods = mock.methods();
    assert_eq!(methods.iter().filter(|m| *m == "initialize").count(), 1);
    assert_eq!(methods[0], "initialize");
    assert_eq!(methods[1], "notifications/initialized");
}
