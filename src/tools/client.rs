//! ToolInvocationClient：工具会话与重试状态机
//!
//! 状态：Uninitialized → Initializing → Ready ⇄ Calling → Closed；
//! 调用中发现会话失效时 Ready → Initializing（重建会话）后再试。
//!
//! 每次 call_tool 最多尝试 `max_retries` 次（含首次）：
//! - 瞬时错误（超时 / 连接失败）：指数退避后重试
//! - 会话失效（HTTP 400/401/403 或错误信息含 "session"）：重建会话，退避后重试
//! - 其它错误：立即返回，不重试
//!
//! 重建会话前先释放旧会话（失败只记录），握手失败按同一重试策略处理。
//!
//! 状态锁只在读写 SessionState 时短暂持有，不跨网络调用；并发重建会话不做协调（后写者生效），
//! 调用方应在启动时完成首次初始化。

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::core::{RecoveryAction, RecoveryEngine, ToolError, TransportError};
use crate::tools::retry::RetryPolicy;
use crate::tools::transport::{ToolDescriptor, ToolTransport};

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    Calling,
    Closed,
}

/// 会话状态（每个客户端至多一个活动会话）
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub discovered_tools: Vec<ToolDescriptor>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            session_id: None,
            discovered_tools: Vec::new(),
        }
    }
}

/// 单次尝试失败后的去向
enum Step {
    Retry(TransportError),
    Stop(ToolError),
}

pub struct ToolInvocationClient {
    transport: Arc<dyn ToolTransport>,
    state: RwLock<SessionState>,
    policy: RetryPolicy,
    recovery: RecoveryEngine,
}

impl ToolInvocationClient {
    pub fn new(transport: Arc<dyn ToolTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            state: RwLock::new(SessionState::default()),
            policy,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// 当前状态快照
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn discovered_tools(&self) -> Vec<ToolDescriptor> {
        self.state.read().await.discovered_tools.clone()
    }

    /// 无条件（重新）建立会话，返回发现的工具；已有会话先释放，同一时刻至多一个活动会话
    pub async fn initialize(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let previous = {
            let mut st = self.state.write().await;
            if st.phase == SessionPhase::Closed {
                return Err(ToolError::Closed);
            }
            st.phase = SessionPhase::Initializing;
            st.session_id.take()
        };

        if let Some(old) = previous.as_deref() {
            if let Err(e) = self.transport.close(Some(old)).await {
                tracing::warn!(session_id = old, "Releasing previous tool session failed: {}", e);
            }
        }

        match self.transport.initialize().await {
            Ok(handshake) => {
                let mut st = self.state.write().await;
                if st.phase == SessionPhase::Closed {
                    return Err(ToolError::Closed);
                }
                st.phase = SessionPhase::Ready;
                st.session_id = handshake.session_id;
                st.discovered_tools = handshake.tools;
                Ok(st.discovered_tools.clone())
            }
            Err(e) => {
                let mut st = self.state.write().await;
                if st.phase != SessionPhase::Closed {
                    st.phase = SessionPhase::Uninitialized;
                    st.session_id = None;
                }
                tracing::warn!("Tool session initialization failed: {}", e);
                Err(ToolError::Initialization(e))
            }
        }
    }

    /// 按重试策略建立会话：瞬时错误与会话错误退避后重试，其它错误立即返回
    pub async fn initialize_with_retries(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.initialize().await {
                Err(ToolError::Initialization(e)) => e,
                other => return other,
            };

            if self.recovery.handle(&err) == RecoveryAction::Abort {
                return Err(ToolError::Initialization(err));
            }
            if attempt >= self.policy.max_attempts {
                tracing::error!(attempts = attempt, "Tool session initialization gave up: {}", err);
                return Err(ToolError::RetriesExhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.policy.delay_for(attempt - 1);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying tool session initialization: {}",
                err
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 尚无可用会话时（带重试）初始化，已就绪则直接返回
    pub async fn ensure_ready(&self) -> Result<(), ToolError> {
        let phase = self.state.read().await.phase;
        match phase {
            SessionPhase::Ready | SessionPhase::Calling => Ok(()),
            SessionPhase::Closed => Err(ToolError::Closed),
            SessionPhase::Uninitialized | SessionPhase::Initializing => {
                self.initialize_with_retries().await.map(|_| ())
            }
        }
    }

    /// 按配置的重试次数调用工具
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        self.call_tool_with_retries(name, arguments, self.policy.max_attempts)
            .await
    }

    /// 调用工具，最多尝试 `max_retries` 次（至少 1 次）；每次调用输出一条 JSON 审计日志
    pub async fn call_tool_with_retries(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        max_retries: u32,
    ) -> Result<Value, ToolError> {
        let start = Instant::now();
        let (result, attempts) = self.run_with_retries(name, arguments, max_retries.max(1)).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::RetriesExhausted { .. }) => "exhausted",
            Err(ToolError::InvalidRequest(_)) => "invalid",
            Err(ToolError::Closed) => "closed",
            Err(_) => "fatal",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "attempts": attempts,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    async fn run_with_retries(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        max_attempts: u32,
    ) -> (Result<Value, ToolError>, u32) {
        if name.trim().is_empty() {
            return (
                Err(ToolError::InvalidRequest("tool name is empty".to_string())),
                0,
            );
        }

        let mut needs_reinit = false;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.attempt_once(name, arguments, &mut needs_reinit).await {
                Ok(value) => return (Ok(value), attempt),
                Err(Step::Stop(e)) => return (Err(e), attempt),
                Err(Step::Retry(e)) => e,
            };

            if attempt >= max_attempts {
                tracing::error!(tool = name, attempts = attempt, "Tool call gave up: {}", err);
                return (
                    Err(ToolError::RetriesExhausted {
                        attempts: attempt,
                        last: err,
                    }),
                    attempt,
                );
            }

            let delay = self.policy.delay_for(attempt - 1);
            tracing::warn!(
                tool = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reinit = needs_reinit,
                "Tool call failed, retrying: {}",
                err
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 一次尝试：必要时先重建会话，再调用工具
    async fn attempt_once(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        needs_reinit: &mut bool,
    ) -> Result<Value, Step> {
        if *needs_reinit {
            match self.initialize().await {
                Ok(_) => *needs_reinit = false,
                Err(ToolError::Initialization(e)) => {
                    return match self.recovery.handle(&e) {
                        RecoveryAction::Abort => Err(Step::Stop(ToolError::Initialization(e))),
                        _ => Err(Step::Retry(e)),
                    };
                }
                Err(other) => return Err(Step::Stop(other)),
            }
        }

        let (session_id, prev_phase) = {
            let mut st = self.state.write().await;
            if st.phase == SessionPhase::Closed {
                return Err(Step::Stop(ToolError::Closed));
            }
            let prev = st.phase;
            st.phase = SessionPhase::Calling;
            (st.session_id.clone(), prev)
        };

        let result = self
            .transport
            .call_tool(session_id.as_deref(), name, arguments)
            .await;

        {
            let mut st = self.state.write().await;
            if st.phase == SessionPhase::Calling {
                st.phase = match prev_phase {
                    SessionPhase::Calling => SessionPhase::Ready,
                    other => other,
                };
            }
        }

        result.map_err(|e| match self.recovery.handle(&e) {
            RecoveryAction::Abort => Step::Stop(ToolError::Fatal(e)),
            RecoveryAction::RetryWithBackoff => Step::Retry(e),
            RecoveryAction::ReinitializeSession => {
                *needs_reinit = true;
                Step::Retry(e)
            }
        })
    }

    /// 释放会话并进入 Closed；之后的调用都返回 ToolError::Closed
    pub async fn close(&self) -> Result<(), ToolError> {
        let session_id = {
            let mut st = self.state.write().await;
            if st.phase == SessionPhase::Closed {
                return Ok(());
            }
            st.phase = SessionPhase::Closed;
            st.session_id.take()
        };
        self.transport
            .close(session_id.as_deref())
            .await
            .map_err(ToolError::Fatal)
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::mock::MockTransport;

    fn client(transport: Arc<MockTransport>, attempts: u32) -> ToolInvocationClient {
        ToolInvocationClient::new(transport, RetryPolicy::new(attempts, 1))
    }

    fn args() -> Map<String, Value> {
        json!({"expression": "2 + 2"}).as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_always_timeout_makes_exactly_max_attempts() {
        let transport = Arc::new(MockTransport::new(Err(TransportError::Timeout("30s".into()))));
        let c = client(transport.clone(), 3);
        c.ensure_ready().await.unwrap();

        let err = c.call_tool("calculate", &args()).await.unwrap_err();
        assert_eq!(transport.call_count(), 3);
        match err {
            ToolError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, TransportError::Timeout(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_max_retries_overrides_policy() {
        let transport = Arc::new(MockTransport::new(Err(TransportError::Connect("refused".into()))));
        let c = client(transport.clone(), 3);
        let _ = c.call_tool_with_retries("calculate", &args(), 5).await;
        assert_eq!(transport.call_count(), 5);

        let transport = Arc::new(MockTransport::new(Err(TransportError::Connect("refused".into()))));
        let c = client(transport.clone(), 3);
        let _ = c.call_tool_with_retries("calculate", &args(), 0).await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let transport = Arc::new(
            MockTransport::new(Ok(json!("4"))).then(Err(TransportError::Timeout("slow".into()))),
        );
        let c = client(transport.clone(), 3);
        c.ensure_ready().await.unwrap();

        let value = c.call_tool("calculate", &args()).await.unwrap();
        assert_eq!(value, json!("4"));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.init_count(), 1);
        assert_eq!(c.state().await.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_session_invalid_reinitializes_then_retries() {
        let transport = Arc::new(MockTransport::new(Ok(json!("sunny"))).then(Err(
            TransportError::Http {
                status: 401,
                body: "expired".into(),
            },
        )));
        let c = client(transport.clone(), 3);
        c.ensure_ready().await.unwrap();
        assert_eq!(c.state().await.session_id.as_deref(), Some("mock-session-1"));

        let value = c.call_tool("get_weather", &args()).await.unwrap();
        assert_eq!(value, json!("sunny"));
        assert_eq!(transport.init_count(), 2);
        let seen: Vec<Option<String>> = transport
            .calls()
            .into_iter()
            .map(|c| c.session_id)
            .collect();
        assert_eq!(
            seen,
            vec![
                Some("mock-session-1".to_string()),
                Some("mock-session-2".to_string())
            ]
        );
        assert_eq!(c.state().await.session_id.as_deref(), Some("mock-session-2"));
        // 失效的旧会话也要释放
        assert_eq!(
            transport.closed_sessions(),
            vec![Some("mock-session-1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reinitialize_releases_previous_session() {
        let transport = Arc::new(MockTransport::new(Ok(json!(1))));
        let c = client(transport.clone(), 3);
        for _ in 0..3 {
            c.initialize().await.unwrap();
        }
        assert_eq!(transport.init_count(), 3);
        assert_eq!(
            transport.closed_sessions(),
            vec![
                Some("mock-session-1".to_string()),
                Some("mock-session-2".to_string())
            ]
        );
        assert_eq!(c.state().await.session_id.as_deref(), Some("mock-session-3"));
    }

    #[tokio::test]
    async fn test_initialize_retries_transient_handshake_failure() {
        let transport = Arc::new(
            MockTransport::new(Ok(json!(1)))
                .then_initialize(Err(TransportError::Timeout("blip".into()))),
        );
        let c = client(transport.clone(), 3);
        let tools = c.initialize_with_retries().await.unwrap();
        assert_eq!(tools[0].name, "calculate");
        assert_eq!(transport.init_count(), 2);
        assert_eq!(c.state().await.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_initialize_gives_up_after_max_attempts() {
        let transport = Arc::new(
            MockTransport::new(Ok(json!(1)))
                .then_initialize(Err(TransportError::Connect("refused".into())))
                .then_initialize(Err(TransportError::Connect("refused".into())))
                .then_initialize(Err(TransportError::Connect("refused".into()))),
        );
        let c = client(transport.clone(), 3);
        let err = c.ensure_ready().await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::RetriesExhausted {
                attempts: 3,
                last: TransportError::Connect(_)
            }
        ));
        assert_eq!(transport.init_count(), 3);
        assert_eq!(c.state().await.phase, SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_fatal_handshake_failure_is_not_retried() {
        let transport = Arc::new(
            MockTransport::new(Ok(json!(1)))
                .then_initialize(Err(TransportError::Malformed("not json".into()))),
        );
        let c = client(transport.clone(), 3);
        let err = c.initialize_with_retries().await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Initialization(TransportError::Malformed("not json".into()))
        );
        assert_eq!(transport.init_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_reinit_failure_during_call_is_retried() {
        let transport = Arc::new(
            MockTransport::new(Ok(json!("4")))
                .then(Err(TransportError::Http {
                    status: 401,
                    body: "expired".into(),
                }))
                .then_initialize(Ok(()))
                .then_initialize(Err(TransportError::Timeout("blip".into()))),
        );
        let c = client(transport.clone(), 3);
        c.initialize().await.unwrap();

        let value = c.call_tool("calculate", &args()).await.unwrap();
        assert_eq!(value, json!("4"));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.init_count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_reinit_failure_during_call_stops() {
        let transport = Arc::new(
            MockTransport::new(Ok(json!("4")))
                .then(Err(TransportError::Http {
                    status: 403,
                    body: "forbidden".into(),
                }))
                .then_initialize(Ok(()))
                .then_initialize(Err(TransportError::Malformed("bad handshake".into()))),
        );
        let c = client(transport.clone(), 3);
        c.initialize().await.unwrap();

        let err = c.call_tool("calculate", &args()).await.unwrap_err();
        assert_eq!(
            err,
            ToolError::Initialization(TransportError::Malformed("bad handshake".into()))
        );
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let transport = Arc::new(MockTransport::new(Err(TransportError::Rpc {
            code: -32602,
            message: "Invalid params".into(),
        })));
        let c = client(transport.clone(), 3);
        c.ensure_ready().await.unwrap();

        let err = c.call_tool("calculate", &args()).await.unwrap_err();
        assert!(matches!(err, ToolError::Fatal(TransportError::Rpc { .. })));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_tool_name_is_rejected() {
        let transport = Arc::new(MockTransport::new(Ok(json!(1))));
        let c = client(transport.clone(), 3);
        let err = c.call_tool("  ", &args()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidRequest(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_discovers_tools() {
        let transport = Arc::new(MockTransport::new(Ok(json!(1))));
        let c = client(transport, 3);
        assert_eq!(c.state().await.phase, SessionPhase::Uninitialized);
        let tools = c.initialize().await.unwrap();
        assert_eq!(tools[0].name, "calculate");
        assert_eq!(c.discovered_tools().await.len(), 1);
        assert_eq!(c.state().await.phase, SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_close_then_call_fails() {
        let transport = Arc::new(MockTransport::new(Ok(json!(1))));
        let c = client(transport.clone(), 3);
        c.ensure_ready().await.unwrap();
        c.close().await.unwrap();
        c.close().await.unwrap();
        assert_eq!(transport.close_count(), 1);
        assert_eq!(c.state().await.phase, SessionPhase::Closed);
        assert!(matches!(
            c.call_tool("calculate", &args()).await,
            Err(ToolError::Closed)
        ));
        assert!(matches!(c.ensure_ready().await, Err(ToolError::Closed)));
    }
}
