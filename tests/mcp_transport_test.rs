//! MCP HTTP 传输集成测试：进程内 axum 服务器模拟 MCP 端点

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use hive::core::{ToolError, TransportError};
use hive::tools::{McpTransport, RetryPolicy, ToolInvocationClient, ToolTransport};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct TestState {
    sessions: Arc<AtomicUsize>,
    active: Arc<Mutex<Option<String>>>,
    methods: Arc<Mutex<Vec<String>>>,
    /// tools/list 请求是否带上了会话头
    saw_session_header: Arc<AtomicBool>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl TestState {
    /// 让当前会话失效，模拟服务器重启
    async fn expire_session(&self) {
        *self.active.lock().await = None;
    }
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn post_handler(
    State(state): State<TestState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let method = body.get("method").and_then(Value::as_str).unwrap_or("").to_string();
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    state.methods.lock().await.push(method.clone());

    if method == "initialize" {
        let n = state.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let sid = format!("sess-{n}");
        *state.active.lock().await = Some(sid.clone());
        let response = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "test-mcp", "version": "1.0.0"}
            }
        });
        return ([("mcp-session-id", sid)], Json(response)).into_response();
    }

    let active = state.active.lock().await.clone();
    let sid = session_of(&headers);
    if active.is_none() || sid != active {
        return (StatusCode::UNAUTHORIZED, "invalid or expired session").into_response();
    }

    match method.as_str() {
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            state.saw_session_header.store(true, Ordering::SeqCst);
            let payload = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "tools": [
                        {"name": "calculate", "description": "Evaluate an arithmetic expression",
                         "inputSchema": {"type": "object"}},
                        {"name": "get_weather", "description": "Current weather for a location"}
                    ]
                }
            });
            // SSE 形式的响应
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                format!("event: message\ndata: {payload}\n\n"),
            )
                .into_response()
        }
        "tools/call" => {
            let name = body["params"]["name"].as_str().unwrap_or("");
            let result = match name {
                "calculate" => json!({"content": [{"type": "text", "text": "4"}]}),
                _ => json!({"content": [{"type": "text", "text": "unknown tool"}], "isError": true}),
            };
            Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
        }
        _ => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .into_response(),
    }
}

async fn delete_handler(State(state): State<TestState>, headers: HeaderMap) -> StatusCode {
    let sid = session_of(&headers);
    let mut active = state.active.lock().await;
    if sid.is_some() && *active == sid {
        *active = None;
    }
    if let Some(sid) = sid {
        state.deleted.lock().await.push(sid);
    }
    StatusCode::OK
}

async fn spawn_server() -> (String, TestState) {
    let state = TestState::default();
    let app = Router::new()
        .route("/mcp", post(post_handler).delete(delete_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn transport(url: &str) -> Arc<McpTransport> {
    Arc::new(McpTransport::new(url, Duration::from_secs(5)).unwrap())
}

fn args(v: Value) -> Map<String, Value> {
    v.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_handshake_discovers_tools_over_sse() {
    let (url, state) = spawn_server().await;
    let t = transport(&url);

    let handshake = t.initialize().await.unwrap();
    assert_eq!(handshake.session_id.as_deref(), Some("sess-1"));
    let names: Vec<_> = handshake.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["calculate", "get_weather"]);
    assert_eq!(handshake.tools[1].description, "Current weather for a location");

    assert_eq!(
        *state.methods.lock().await,
        vec!["initialize", "notifications/initialized", "tools/list"]
    );
    assert!(state.saw_session_header.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_call_tool_returns_first_text_content() {
    let (url, _state) = spawn_server().await;
    let client = ToolInvocationClient::new(transport(&url), RetryPolicy::new(3, 1));

    let tools = client.initialize().await.unwrap();
    assert_eq!(tools.len(), 2);
    let value = client
        .call_tool("calculate", &args(json!({"expression": "2 + 2"})))
        .await
        .unwrap();
    assert_eq!(value, json!("4"));
}

#[tokio::test]
async fn test_expired_session_is_reinitialized() {
    let (url, state) = spawn_server().await;
    let client = ToolInvocationClient::new(transport(&url), RetryPolicy::new(3, 1));
    client.initialize().await.unwrap();

    state.expire_session().await;
    let value = client
        .call_tool("calculate", &args(json!({"expression": "2 + 2"})))
        .await
        .unwrap();
    assert_eq!(value, json!("4"));
    assert_eq!(state.sessions.load(Ordering::SeqCst), 2);
    assert_eq!(client.state().await.session_id.as_deref(), Some("sess-2"));
    assert_eq!(*state.deleted.lock().await, vec!["sess-1".to_string()]);
}

#[tokio::test]
async fn test_reinitialize_deletes_replaced_session() {
    let (url, state) = spawn_server().await;
    let client = ToolInvocationClient::new(transport(&url), RetryPolicy::new(3, 1));

    for _ in 0..3 {
        client.initialize().await.unwrap();
    }
    assert_eq!(state.sessions.load(Ordering::SeqCst), 3);
    assert_eq!(
        *state.deleted.lock().await,
        vec!["sess-1".to_string(), "sess-2".to_string()]
    );
    let value = client
        .call_tool("calculate", &args(json!({"expression": "2 + 2"})))
        .await
        .unwrap();
    assert_eq!(value, json!("4"));
}

#[tokio::test]
async fn test_tool_reported_error_is_not_retried() {
    let (url, state) = spawn_server().await;
    let client = ToolInvocationClient::new(transport(&url), RetryPolicy::new(3, 1));
    client.initialize().await.unwrap();

    let err = client
        .call_tool("launch_rocket", &args(json!({})))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ToolError::Fatal(TransportError::ToolReported("unknown tool".into()))
    );
    let calls = state
        .methods
        .lock()
        .await
        .iter()
        .filter(|m| *m == "tools/call")
        .count();
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn test_close_deletes_session() {
    let (url, state) = spawn_server().await;
    let client = ToolInvocationClient::new(transport(&url), RetryPolicy::new(3, 1));
    client.initialize().await.unwrap();

    client.close().await.unwrap();
    assert_eq!(*state.deleted.lock().await, vec!["sess-1".to_string()]);

    let err = client
        .call_tool("calculate", &args(json!({"expression": "1"})))
        .await
        .unwrap_err();
    assert_eq!(err, ToolError::Closed);
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // 绑定后立即释放端口，连接会被拒绝
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ToolInvocationClient::new(
        transport(&format!("http://{addr}")),
        RetryPolicy::new(2, 1),
    );
    let err = client
        .call_tool("calculate", &args(json!({"expression": "1"})))
        .await
        .unwrap_err();
    match err {
        ToolError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(last, TransportError::Connect(_)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}
