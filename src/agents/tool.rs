//! 工具 Handler
//!
//! 1. 按会话策略确保会话可用（默认每次调用都重新初始化，旧会话随之释放；握手失败按重试策略重试）
//! 2. 把已发现的工具列表写进 system prompt，请 LLM 决定是否调用工具
//! 3. 解析出调用则经 ToolInvocationClient 执行并格式化结果，否则原样返回 LLM 的回答
//!
//! 消息含工具关键词却没解析出调用时，带纠正提示重试一次；仍失败则返回第一次的回答。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Handler;
use crate::config::SessionPolicy;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::message::UserMessage;
use crate::router::KeywordRules;
use crate::tools::{
    format_tool_result, ToolCallParser, ToolDescriptor, ToolInvocationClient,
    ToolInvocationRequest,
};

pub const TOOL_HEADER: &str = "[Tool Agent]";

pub struct ToolHandler {
    llm: Arc<dyn LlmClient>,
    client: Arc<ToolInvocationClient>,
    parser: ToolCallParser,
    rules: KeywordRules,
    session_policy: SessionPolicy,
}

impl ToolHandler {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        client: Arc<ToolInvocationClient>,
        rules: KeywordRules,
        session_policy: SessionPolicy,
    ) -> Self {
        Self {
            llm,
            client,
            parser: ToolCallParser::new(),
            rules,
            session_policy,
        }
    }

    async fn ensure_session(&self) -> Result<(), AgentError> {
        match self.session_policy {
            SessionPolicy::ReinitializeEachCall => {
                self.client.initialize_with_retries().await?;
            }
            SessionPolicy::Lazy => self.client.ensure_ready().await?,
        }
        Ok(())
    }

    /// 没解析出调用时的一次纠正重试；重试本身失败视为没有调用
    async fn corrective_retry(
        &self,
        system: &str,
        message: &UserMessage,
    ) -> Option<ToolInvocationRequest> {
        tracing::info!("No tool call parsed for a tool-keyword message, retrying once");
        let prompt = format!(
            "{}\n\nThis request needs one of the available tools. Respond ONLY with the JSON tool call \
             {{\"tool\": \"tool_name\", \"arguments\": {{...}}}} and nothing else.",
            message.text
        );
        match self.llm.generate(system, &prompt).await {
            Ok(retry) => self.parser.parse(&retry),
            Err(e) => {
                tracing::warn!("Corrective retry failed: {}", e);
                None
            }
        }
    }
}

fn tool_system_prompt(tools: &[ToolDescriptor]) -> String {
    let listing = if tools.is_empty() {
        "- (the server did not list any tools)".to_string()
    } else {
        tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You are a specialized agent that uses external tools.\n\n\
         Available tools:\n{listing}\n\n\
         When a user asks a question:\n\
         1. Decide whether a tool is needed\n\
         2. If yes, respond ONLY with JSON: {{\"tool\": \"tool_name\", \"arguments\": {{...}}}}\n\
         3. If no tool is needed, respond normally\n\n\
         Example: \"What's 2 + 2?\" -> {{\"tool\": \"calculate\", \"arguments\": {{\"expression\": \"2 + 2\"}}}}"
    )
}

#[async_trait]
impl Handler for ToolHandler {
    fn name(&self) -> &'static str {
        "Tool Agent"
    }

    fn phase(&self) -> &'static str {
        "tool execution"
    }

    async fn run(&self, message: &UserMessage) -> Result<String, AgentError> {
        self.ensure_session().await?;

        let tools = self.client.discovered_tools().await;
        let system = tool_system_prompt(&tools);
        let answer = self.llm.generate(&system, &message.text).await?;

        let call = match self.parser.parse(&answer) {
            Some(call) => Some(call),
            None if self.rules.mentions_tool(&message.text) => {
                self.corrective_retry(&system, message).await
            }
            None => None,
        };

        let Some(call) = call else {
            return Ok(format!("{TOOL_HEADER}\n{}", answer.trim()));
        };

        tracing::info!(tool = %call.tool_name, "[tool] calling");
        let value = self
            .client
            .call_tool(&call.tool_name, &call.arguments)
            .await?;
        Ok(format!(
            "{TOOL_HEADER}\n{}",
            format_tool_result(&call.tool_name, &value)
        ))
    }
}
