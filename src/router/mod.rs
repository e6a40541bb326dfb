//! 路由：把一条用户消息分派到 Tool / Research / General / Orchestrator
//!
//! 两阶段，先命中者胜：
//! 1. 确定性规则（`KeywordRules`），不调用 LLM
//! 2. 生成式分类：请 LLM 只回答一个标签，按 orchestrator > tool > research > general
//!    的优先级做子串匹配，都没命中则为 General
//!
//! 第 2 阶段 LLM 调用本身失败时返回 `AgentError::Routing`，不重试，也不静默回退 General。

pub mod rules;

use std::fmt;
use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::message::UserMessage;

pub use rules::{KeywordRules, RuleSignals};

/// 出现在路由 system prompt 中，Mock 客户端据此识别路由请求
pub const ROUTER_SYSTEM_MARKER: &str = "You are a message router.";

const ROUTER_SYSTEM_PROMPT: &str = "You are a message router. Classify the user's message into exactly one label:
- tool: needs an external tool (weather, calculation, current time, random numbers)
- research: asks about concepts or documentation that a knowledge base could answer
- orchestrator: needs BOTH a tool and knowledge-base research
- general: casual conversation or anything else
Reply with the single label only.";

/// 路由结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDecision {
    Tool,
    Research,
    General,
    Orchestrator,
}

impl RouteDecision {
    /// 生成式阶段的匹配优先级
    pub const PRIORITY: [RouteDecision; 4] = [
        RouteDecision::Orchestrator,
        RouteDecision::Tool,
        RouteDecision::Research,
        RouteDecision::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteDecision::Tool => "tool",
            RouteDecision::Research => "research",
            RouteDecision::General => "general",
            RouteDecision::Orchestrator => "orchestrator",
        }
    }

    /// 解析 LLM 给出的标签；无法识别时为 General
    pub fn from_label(output: &str) -> Self {
        let lower = output.trim().to_lowercase();
        Self::PRIORITY
            .into_iter()
            .find(|d| lower.contains(d.as_str()))
            .unwrap_or(RouteDecision::General)
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Router {
    rules: KeywordRules,
    llm: Arc<dyn LlmClient>,
}

impl Router {
    pub fn new(rules: KeywordRules, llm: Arc<dyn LlmClient>) -> Self {
        Self { rules, llm }
    }

    pub async fn classify(&self, message: &UserMessage) -> Result<RouteDecision, AgentError> {
        if let Some(decision) = self.rules.decide(&message.text) {
            tracing::info!(route = %decision, stage = "rules", "message routed");
            return Ok(decision);
        }

        let prompt = format!("Route this: {}", message.text);
        let output = self
            .llm
            .generate(ROUTER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(AgentError::Routing)?;
        let decision = RouteDecision::from_label(&output);
        tracing::info!(route = %decision, stage = "llm", raw = %output.trim(), "message routed");
        Ok(decision)
    }
}
