//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / 脚本化）

pub mod logging;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use logging::LoggingLlmClient;
pub use message::{Message, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError, LlmOutput};

/// 按配置创建 LLM 客户端：provider 为 openai 且有 OPENAI_API_KEY 时走 OpenAI 兼容端点，否则回退 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            let model = cfg.llm.model.clone();
            tracing::info!("Using OpenAI-compatible LLM ({})", model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, Some(&key))
                    .with_timeout(cfg.llm.timeout_secs),
            )
        }
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        _ => {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}
