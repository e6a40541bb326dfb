//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、Azure 代理、自建网关等。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::llm::{LlmClient, LlmError, LlmOutput, Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条回复
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    /// 单次请求超时
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let invalid = |e: async_openai::error::OpenAIError| LlmError::InvalidRequest(e.to_string());
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<LlmOutput, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::Request("response contained no choices".to_string()))?;

        match choice.message.content.as_deref() {
            Some(content) if !content.trim().is_empty() => Ok(LlmOutput::Text(content.to_string())),
            // 无文本内容（如原生 tool_calls）时作为结构化负载交给上层
            _ => {
                let message = serde_json::to_value(&choice.message)
                    .map_err(|e| LlmError::Request(e.to_string()))?;
                Ok(LlmOutput::Structured(
                    native_tool_call(&message).unwrap_or(message),
                ))
            }
        }
    }
}

/// 原生 `tool_calls` 的第一个函数调用转为 `{"tool", "arguments"}`，与文本形式的调用格式一致
fn native_tool_call(message: &Value) -> Option<Value> {
    let function = message
        .get("tool_calls")?
        .as_array()?
        .first()?
        .get("function")?;
    let name = function.get("name")?.as_str()?;
    let arguments = match function.get("arguments") {
        // 线上格式中 arguments 是 JSON 字符串
        Some(Value::String(raw)) if raw.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(raw)) => serde_json::from_str(raw).ok()?,
        Some(other) => other.clone(),
        None => Value::Object(Map::new()),
    };
    arguments
        .is_object()
        .then(|| json!({"tool": name, "arguments": arguments}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCallParser;

    #[test]
    fn test_native_tool_call_is_normalized() {
        let message = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"location\": \"Seoul\"}"}
            }]
        });
        let call = native_tool_call(&message).unwrap();
        assert_eq!(call, json!({"tool": "get_weather", "arguments": {"location": "Seoul"}}));

        // 规整后的输出能被文本解析器直接识别
        let parsed = ToolCallParser::new()
            .parse(&LlmOutput::Structured(call).into_text())
            .unwrap();
        assert_eq!(parsed.tool_name, "get_weather");
        assert_eq!(parsed.arguments["location"], json!("Seoul"));
    }

    #[test]
    fn test_native_tool_call_without_arguments() {
        let message = json!({
            "tool_calls": [{"type": "function", "function": {"name": "get_current_time", "arguments": ""}}]
        });
        assert_eq!(
            native_tool_call(&message),
            Some(json!({"tool": "get_current_time", "arguments": {}}))
        );
    }

    #[test]
    fn test_unusable_tool_calls_fall_back() {
        assert_eq!(native_tool_call(&json!({"role": "assistant", "content": null})), None);
        assert_eq!(native_tool_call(&json!({"tool_calls": []})), None);
        let bad_args = json!({
            "tool_calls": [{"function": {"name": "calculate", "arguments": "not json"}}]
        });
        assert_eq!(native_tool_call(&bad_args), None);
        let array_args = json!({
            "tool_calls": [{"function": {"name": "calculate", "arguments": "[1, 2]"}}]
        });
        assert_eq!(native_tool_call(&array_args), None);
    }

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 2);
        assert_eq!(usage.get(), (11, 7, 18));
    }
}
