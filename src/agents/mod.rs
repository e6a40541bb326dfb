//! Handler：对一条已分类消息给出完整回复
//!
//! - `ToolHandler`：LLM 决定工具调用，经 ToolInvocationClient 执行
//! - `ResearchHandler`：检索知识库后让 LLM 带引用作答
//! - `GeneralHandler`：闲聊直通
//! - `OrchestratorHandler`：并发运行 Tool 与 Research，按固定顺序拼接
//! - `DisabledHandler`：后端未配置时的占位，直接返回固定提示

pub mod general;
pub mod orchestrator;
pub mod research;
pub mod tool;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::message::UserMessage;

pub use general::GeneralHandler;
pub use orchestrator::OrchestratorHandler;
pub use research::ResearchHandler;
pub use tool::ToolHandler;

pub const TOOL_NOT_CONFIGURED: &str = "Tool Agent: MCP endpoint not configured";
pub const RESEARCH_NOT_CONFIGURED: &str = "Research Agent: Search not configured";

#[async_trait]
pub trait Handler: Send + Sync {
    /// 面向用户的名字，如 "Tool Agent"
    fn name(&self) -> &'static str;

    /// 错误文本 "Error in <phase>: ..." 中的阶段名
    fn phase(&self) -> &'static str;

    async fn run(&self, message: &UserMessage) -> Result<String, AgentError>;
}

/// 后端未配置的 Handler：不报错，直接返回固定提示
pub struct DisabledHandler {
    name: &'static str,
    phase: &'static str,
    notice: &'static str,
}

impl DisabledHandler {
    pub fn tool() -> Self {
        Self {
            name: "Tool Agent",
            phase: "tool execution",
            notice: TOOL_NOT_CONFIGURED,
        }
    }

    pub fn research() -> Self {
        Self {
            name: "Research Agent",
            phase: "research",
            notice: RESEARCH_NOT_CONFIGURED,
        }
    }
}

#[async_trait]
impl Handler for DisabledHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn phase(&self) -> &'static str {
        self.phase
    }

    async fn run(&self, _message: &UserMessage) -> Result<String, AgentError> {
        Ok(self.notice.to_string())
    }
}
