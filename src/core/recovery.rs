//! 错误恢复引擎
//!
//! 将工具传输错误映射为 RecoveryAction，供 ToolInvocationClient 决定是退避重试、重建会话还是终止。

use crate::core::{RecoveryAction, TransportError};

/// 视为会话失效的 HTTP 状态码
const SESSION_INVALID_STATUS: [u16; 3] = [400, 401, 403];

/// 语义化错误恢复：将传输错误映射为可执行动作
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 分类顺序：瞬时 > 会话失效 > 其它
    pub fn handle(&self, err: &TransportError) -> RecoveryAction {
        match err {
            TransportError::Timeout(_) | TransportError::Connect(_) => {
                RecoveryAction::RetryWithBackoff
            }
            TransportError::NoSession => RecoveryAction::ReinitializeSession,
            TransportError::Http { status, body } => {
                if SESSION_INVALID_STATUS.contains(status) || mentions_session(body) {
                    RecoveryAction::ReinitializeSession
                } else {
                    RecoveryAction::Abort
                }
            }
            TransportError::Rpc { message, .. } if mentions_session(message) => {
                RecoveryAction::ReinitializeSession
            }
            TransportError::Rpc { .. }
            | TransportError::ToolReported(_)
            | TransportError::Malformed(_) => RecoveryAction::Abort,
        }
    }
}

fn mentions_session(text: &str) -> bool {
    text.to_lowercase().contains("session")
}
