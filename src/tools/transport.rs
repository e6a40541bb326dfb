//! 工具传输抽象
//!
//! 传输层本身不保存会话：会话 ID 由 ToolInvocationClient 持有，每次调用显式传入。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::TransportError;

/// 服务器声明的工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// 初始化握手结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHandshake {
    /// 不需要会话的传输返回 None
    pub session_id: Option<String>,
    pub tools: Vec<ToolDescriptor>,
}

#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// 建立会话并发现工具
    async fn initialize(&self) -> Result<SessionHandshake, TransportError>;

    /// 在给定会话上调用工具，成功返回工具结果（JSON 或字符串）
    async fn call_tool(
        &self,
        session_id: Option<&str>,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError>;

    /// 释放会话；默认无操作
    async fn close(&self, _session_id: Option<&str>) -> Result<(), TransportError> {
        Ok(())
    }
}
