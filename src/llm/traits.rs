//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 脚本化测试客户端）实现 LlmClient::complete，
//! 统一返回带标签的 LlmOutput，上层无需探测返回对象的形状。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("invalid LLM request: {0}")]
    InvalidRequest(String),
}

/// 一次完成的结果：纯文本，或后端直接给出的结构化负载（如原生 tool_calls）
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl LlmOutput {
    /// 统一转为文本；结构化负载序列化为 JSON，交给 ToolCallParser 解析
    pub fn into_text(self) -> String {
        match self {
            LlmOutput::Text(s) => s,
            LlmOutput::Structured(serde_json::Value::String(s)) => s,
            LlmOutput::Structured(v) => v.to_string(),
        }
    }
}

impl From<String> for LlmOutput {
    fn from(s: String) -> Self {
        LlmOutput::Text(s)
    }
}

impl From<&str> for LlmOutput {
    fn from(s: &str) -> Self {
        LlmOutput::Text(s.to_string())
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<LlmOutput, LlmError>;

    /// system + user 两条消息的便捷调用，结果转为文本
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let messages = [Message::system(system), Message::user(prompt)];
        Ok(self.complete(&messages).await?.into_text())
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
