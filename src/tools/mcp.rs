//! MCP（Model Context Protocol）HTTP 传输
//!
//! JSON-RPC 2.0 over HTTP POST，端点为 `{server_url}/mcp`：
//! - `initialize` 响应头中的 `mcp-session-id` 即会话 ID，之后每个请求都带上该头
//! - 握手后发送 `notifications/initialized`，再 `tools/list` 发现工具
//! - 响应体可能是普通 JSON，也可能是 SSE（取第一条带 result / error 的 `data:` 行）
//! - `close` 以 DELETE 释放会话，服务器不支持时（405）忽略

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use crate::core::TransportError;
use crate::tools::transport::{SessionHandshake, ToolDescriptor, ToolTransport};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// MCP Streamable HTTP 传输（无状态，会话 ID 由调用方传入）
pub struct McpTransport {
    http: reqwest::Client,
    endpoint: String,
    client_name: String,
    next_id: AtomicU64,
}

impl McpTransport {
    /// `server_url` 为服务器根地址；已以 `/mcp` 结尾时不再追加
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: mcp_endpoint(server_url),
            client_name: "hive-tool-agent".to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
    }

    fn post(&self, session_id: Option<&str>, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, ACCEPT_VALUE)
            .json(body);
        if let Some(sid) = session_id {
            req = req.header(SESSION_HEADER, sid);
        }
        req
    }

    /// 发送一个 JSON-RPC 请求，返回（响应头中的会话 ID，result）
    async fn rpc(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<(Option<String>, Value), TransportError> {
        let body = self.request(method, params);
        let response = self.post(session_id, &body).send().await?;
        let status = response.status();
        let returned_session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        let result = parse_rpc_body(&text)?;
        Ok((returned_session, result))
    }

    async fn notify(&self, session_id: Option<&str>, method: &str) -> Result<(), TransportError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {},
        });
        let response = self.post(session_id, &body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl ToolTransport for McpTransport {
    async fn initialize(&self) -> Result<SessionHandshake, TransportError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": self.client_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let (session_id, init) = self.rpc(None, "initialize", params).await?;
        tracing::info!(
            session_id = session_id.as_deref().unwrap_or("-"),
            server = %init.get("serverInfo").cloned().unwrap_or(serde_json::Value::Null),
            "MCP session initialized"
        );

        let sid = session_id.as_deref();
        self.notify(sid, "notifications/initialized").await?;

        let (_, listed) = self.rpc(sid, "tools/list", json!({})).await?;
        let tools: Vec<ToolDescriptor> = match listed.get("tools") {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| TransportError::Malformed(format!("tools/list: {e}")))?,
            None => Vec::new(),
        };
        tracing::info!("Discovered {} MCP tools", tools.len());
        for tool in &tools {
            tracing::debug!("   - {}: {}", tool.name, tool.description);
        }

        Ok(SessionHandshake { session_id, tools })
    }

    async fn call_tool(
        &self,
        session_id: Option<&str>,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        let params = json!({
            "name": name,
            "arguments": arguments,
        });
        let (_, result) = self.rpc(session_id, "tools/call", params).await?;

        let text = first_text_content(&result);
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            let message = text.unwrap_or_else(|| result.to_string());
            return Err(TransportError::ToolReported(message));
        }
        Ok(match text {
            Some(t) => Value::String(t),
            None => result,
        })
    }

    async fn close(&self, session_id: Option<&str>) -> Result<(), TransportError> {
        let Some(sid) = session_id else {
            return Ok(());
        };
        let response = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(TransportError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

fn mcp_endpoint(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    if base.ends_with("/mcp") {
        base.to_string()
    } else {
        format!("{base}/mcp")
    }
}

/// `content[0].text`，没有时返回 None
fn first_text_content(result: &Value) -> Option<String> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(String::from)
}

/// 解析 JSON-RPC 响应体（普通 JSON 或 SSE），返回 result；error 对象转为 Rpc 错误
pub fn parse_rpc_body(body: &str) -> Result<Value, TransportError> {
    let envelope = sse_envelope(body)
        .or_else(|| serde_json::from_str::<Value>(body.trim()).ok())
        .ok_or_else(|| TransportError::Malformed(preview(body)))?;

    if let Some(err) = envelope.get("error") {
        return Err(TransportError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    envelope
        .get("result")
        .cloned()
        .ok_or_else(|| TransportError::Malformed(preview(body)))
}

/// SSE：第一条含 result 或 error 的 `data:` 行
fn sse_envelope(body: &str) -> Option<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .find(|v| v.get("result").is_some() || v.get("error").is_some())
}

fn preview(body: &str) -> String {
    let s: String = body.chars().take(200).collect();
    if s.is_empty() {
        "empty body".to_string()
    } else {
        s
    }
}
