//! Mock 工具传输（用于测试与离线调试，无需 MCP 服务器）
//!
//! 调用结果按队列给出，队列空后返回 fallback；初始化结果同样可排队（空时成功）。
//! 记录每次调用的会话 ID、工具名与参数，以及被释放的会话。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::TransportError;
use crate::tools::transport::{SessionHandshake, ToolDescriptor, ToolTransport};

/// 一次被记录的调用
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub session_id: Option<String>,
    pub name: String,
    pub arguments: Map<String, Value>,
}

pub struct MockTransport {
    tools: Vec<ToolDescriptor>,
    script: Mutex<VecDeque<Result<Value, TransportError>>>,
    init_script: Mutex<VecDeque<Result<(), TransportError>>>,
    fallback: Result<Value, TransportError>,
    delay: Option<Duration>,
    inits: AtomicU32,
    closed: Mutex<Vec<Option<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// 每次调用都返回 `fallback`
    pub fn new(fallback: Result<Value, TransportError>) -> Self {
        Self {
            tools: vec![ToolDescriptor {
                name: "calculate".into(),
                description: "Evaluate an arithmetic expression".into(),
            }],
            script: Mutex::new(VecDeque::new()),
            init_script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            inits: AtomicU32::new(0),
            closed: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// 在 fallback 之前先返回的结果
    pub fn then(self, result: Result<Value, TransportError>) -> Self {
        self.lock_script().push_back(result);
        self
    }

    /// 排队一次初始化结果；队列空时初始化总是成功
    pub fn then_initialize(self, result: Result<(), TransportError>) -> Self {
        self.init_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn init_count(&self) -> u32 {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.lock_closed().len() as u32
    }

    /// 依次被释放的会话 ID
    pub fn closed_sessions(&self) -> Vec<Option<String>> {
        self.lock_closed().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock_calls().clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Value, TransportError>>> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_closed(&self) -> std::sync::MutexGuard<'_, Vec<Option<String>>> {
        self.closed.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ToolTransport for MockTransport {
    async fn initialize(&self) -> Result<SessionHandshake, TransportError> {
        let n = self.inits.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self
            .init_script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }
        Ok(SessionHandshake {
            session_id: Some(format!("mock-session-{n}")),
            tools: self.tools.clone(),
        })
    }

    async fn call_tool(
        &self,
        session_id: Option<&str>,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        self.lock_calls().push(RecordedCall {
            session_id: session_id.map(String::from),
            name: name.to_string(),
            arguments: arguments.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.lock_script().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    async fn close(&self, session_id: Option<&str>) -> Result<(), TransportError> {
        self.lock_closed().push(session_id.map(String::from));
        Ok(())
    }
}
