//! 错误类型与恢复动作
//!
//! 分三层：
//! - `TransportError`：工具传输层（HTTP / JSON-RPC）的原始失败
//! - `ToolError`：ToolInvocationClient 在重试与会话恢复之后给出的最终失败
//! - `AgentError`：Handler / Router 边界上的错误，最终由运行时转为 "Error in <phase>: ..." 文本
//!
//! 与 RecoveryEngine 配合：根据 TransportError 决定退避重试 / 重建会话 / 立即终止。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::retrieval::RetrievalError;

/// 工具传输层错误（一次请求的原始失败，尚未分类）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// 请求需要会话，但当前没有可用会话
    #[error("no active session")]
    NoSession,

    /// 工具自身返回 isError
    #[error("tool reported error: {0}")]
    ToolReported(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else if e.is_decode() {
            TransportError::Malformed(e.to_string())
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

/// ToolInvocationClient 的最终失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("invalid tool request: {0}")]
    InvalidRequest(String),

    #[error("tool client is closed")]
    Closed,

    #[error("session initialization failed: {0}")]
    Initialization(TransportError),

    /// 不可重试的错误，首次出现即返回
    #[error("{0}")]
    Fatal(TransportError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },
}

/// Handler / Router 边界错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 生成式路由阶段的 LLM 调用本身失败（不是标签无法识别）
    #[error("{0}")]
    Routing(LlmError),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("{0}")]
    Retrieval(#[from] RetrievalError),

    /// 单次请求总时限到期（如 "deadline of 120s exceeded"、"deadline of 50ms exceeded"）
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Config error: {0}")]
    Config(String),
}

/// 恢复引擎根据传输错误给出的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 瞬时错误（超时 / 连接失败）：退避后重试
    RetryWithBackoff,
    /// 会话失效：重建会话后退避重试
    ReinitializeSession,
    /// 其它错误：立即终止
    Abort,
}
