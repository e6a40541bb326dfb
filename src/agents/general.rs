//! 闲聊 Handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Handler;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::message::UserMessage;

const GENERAL_SYSTEM_PROMPT: &str = "You are a friendly general assistant. \
Answer casually and briefly. Do not invent tool results or cite sources.";

pub struct GeneralHandler {
    llm: Arc<dyn LlmClient>,
}

impl GeneralHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Handler for GeneralHandler {
    fn name(&self) -> &'static str {
        "General Agent"
    }

    fn phase(&self) -> &'static str {
        "general conversation"
    }

    async fn run(&self, message: &UserMessage) -> Result<String, AgentError> {
        let reply = self.llm.generate(GENERAL_SYSTEM_PROMPT, &message.text).await?;
        Ok(reply.trim().to_string())
    }
}
