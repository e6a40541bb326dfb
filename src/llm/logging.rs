//! 带脱敏日志的 LLM 装饰器
//!
//! 包装任意 LlmClient：debug 级别记录脱敏后的最后一条 User 消息与回复，info 级别记录耗时。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmOutput, Message, Role};
use crate::observability::MaskingMode;

pub struct LoggingLlmClient {
    inner: Arc<dyn LlmClient>,
    masking: MaskingMode,
    log_prompts: bool,
}

impl LoggingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, masking: MaskingMode, log_prompts: bool) -> Self {
        Self {
            inner,
            masking,
            log_prompts,
        }
    }
}

#[async_trait]
impl LlmClient for LoggingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<LlmOutput, LlmError> {
        if self.log_prompts {
            if let Some(prompt) = messages.iter().rev().find(|m| m.role == Role::User) {
                tracing::debug!(prompt = %self.masking.apply(&prompt.content), "[llm] request");
            }
        }

        let start = Instant::now();
        let result = self.inner.complete(messages).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                tracing::info!(elapsed_ms, "[llm] completed");
                if self.log_prompts {
                    let text = match output {
                        LlmOutput::Text(s) => s.clone(),
                        LlmOutput::Structured(v) => v.to_string(),
                    };
                    tracing::debug!(completion = %self.masking.apply(&text), "[llm] response");
                }
            }
            Err(e) => tracing::warn!(elapsed_ms, "[llm] failed: {}", e),
        }
        result
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[tokio::test]
    async fn test_passthrough() {
        let inner = Arc::new(ScriptedLlmClient::new().push_text("hello a@b.com"));
        let llm = LoggingLlmClient::new(inner.clone(), MaskingMode::Strict, true);
        let out = llm.generate("sys", "hi").await.unwrap();
        // 脱敏只作用于日志，不改变返回值
        assert_eq!(out, "hello a@b.com");
        assert_eq!(inner.call_count(), 1);
    }

    struct Metered;

    #[async_trait]
    impl LlmClient for Metered {
        async fn complete(&self, _messages: &[Message]) -> Result<LlmOutput, LlmError> {
            Ok("ok".into())
        }

        fn token_usage(&self) -> (u64, u64, u64) {
            (12, 30, 42)
        }
    }

    #[test]
    fn test_token_usage_is_forwarded() {
        let llm = LoggingLlmClient::new(Arc::new(Metered), MaskingMode::Standard, false);
        assert_eq!(llm.token_usage(), (12, 30, 42));
    }
}
