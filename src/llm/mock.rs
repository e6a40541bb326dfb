//! Mock / 脚本化 LLM 客户端（无需 API）
//!
//! - `MockLlmClient`：离线回退，路由请求一律答 `general`，其余回显最后一条 User 消息
//! - `ScriptedLlmClient`：测试用，按队列或闭包给出回复，可注入延迟与失败，并记录每次收到的消息

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmOutput, Message, Role};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User))
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

fn system_prompt(messages: &[Message]) -> &str {
    messages
        .iter()
        .find(|m| matches!(m.role, Role::System))
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Mock 客户端：路由提问答 general，其它回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<LlmOutput, LlmError> {
        if system_prompt(messages).contains(crate::router::ROUTER_SYSTEM_MARKER) {
            return Ok(LlmOutput::Text("general".to_string()));
        }
        Ok(LlmOutput::Text(format!(
            "Echo from Mock: {}",
            last_user(messages)
        )))
    }
}

type Responder = Box<dyn Fn(&[Message]) -> Result<LlmOutput, LlmError> + Send + Sync>;

/// 脚本化客户端：优先消费队列，队列为空时交给 responder；都没有则返回错误
pub struct ScriptedLlmClient {
    queue: Mutex<VecDeque<Result<LlmOutput, LlmError>>>,
    responder: Option<Responder>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 按消息内容决定回复（并发调用时顺序不确定，用它代替队列）
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<LlmOutput, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new()
        }
    }

    /// 永远失败的客户端
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(move |_| Err(LlmError::Request(message.clone())))
    }

    pub fn push_text(self, text: impl Into<String>) -> Self {
        self.lock_queue().push_back(Ok(LlmOutput::Text(text.into())));
        self
    }

    pub fn push_output(self, output: LlmOutput) -> Self {
        self.lock_queue().push_back(Ok(output));
        self
    }

    pub fn push_error(self, err: LlmError) -> Self {
        self.lock_queue().push_back(Err(err));
        self
    }

    /// 每次调用前等待
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// 每次调用收到的完整消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.lock_calls().clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<LlmOutput, LlmError>>> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<Vec<Message>>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<LlmOutput, LlmError> {
        self.lock_calls().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.lock_queue().pop_front();
        match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(f)) => f(messages),
            (None, None) => Err(LlmError::Request("script exhausted".to_string())),
        }
    }
}
