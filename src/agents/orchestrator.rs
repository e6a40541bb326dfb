//! 编排 Handler：Tool 与 Research 并发运行，结果按槽位顺序拼接
//!
//! 两个分支用 `tokio::join!` 同时推进，总耗时约为 max(tool, research)。
//! 每个分支的 `Result` 先就地转为文本（错误变成 "<Agent> error: ..."），一个分支失败不会中断另一个。
//! 输出固定为 tool 在前、research 在后，中间空一行，与完成先后无关。没有超时，也不取最先完成者。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Handler;
use crate::core::AgentError;
use crate::message::UserMessage;

pub struct OrchestratorHandler {
    tool: Arc<dyn Handler>,
    research: Arc<dyn Handler>,
}

impl OrchestratorHandler {
    /// 未配置的分支传入 `DisabledHandler`
    pub fn new(tool: Arc<dyn Handler>, research: Arc<dyn Handler>) -> Self {
        Self { tool, research }
    }
}

fn settle(handler: &dyn Handler, result: Result<String, AgentError>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("{} error: {}", handler.name(), e);
            format!("{} error: {}", handler.name(), e)
        }
    }
}

#[async_trait]
impl Handler for OrchestratorHandler {
    fn name(&self) -> &'static str {
        "Orchestrator"
    }

    fn phase(&self) -> &'static str {
        "orchestration"
    }

    async fn run(&self, message: &UserMessage) -> Result<String, AgentError> {
        tracing::info!("[orchestrator] running tool and research branches");
        let (tool, research) = tokio::join!(self.tool.run(message), self.research.run(message));

        let tool = settle(self.tool.as_ref(), tool);
        let research = settle(self.research.as_ref(), research);
        Ok(format!("{tool}\n\n{research}"))
    }
}
