//! 确定性路由规则：关键词 + 连接词 + 字数阈值
//!
//! | 工具词 | 研究词 | 连接词 | 字数 < 阈值 | 结果 |
//! |---|---|---|---|---|
//! | ✓ | ✓ | ✓ | - | Orchestrator |
//! | ✓ | ✗ | - | ✓ | Tool |
//! | 其它 | | | | None（交给生成式阶段） |

use crate::config::RouterSection;
use crate::router::RouteDecision;

/// 一条消息命中的规则信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSignals {
    pub has_tool: bool,
    pub has_research: bool,
    pub has_connector: bool,
    pub word_count: usize,
}

#[derive(Debug, Clone)]
pub struct KeywordRules {
    tool_keywords: Vec<String>,
    research_keywords: Vec<String>,
    connectors: Vec<String>,
    word_threshold: usize,
}

impl KeywordRules {
    /// 关键词统一转小写；连接词保留首尾空格
    pub fn new(
        tool_keywords: Vec<String>,
        research_keywords: Vec<String>,
        connectors: Vec<String>,
        word_threshold: usize,
    ) -> Self {
        let lower = |v: Vec<String>| -> Vec<String> {
            v.into_iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.trim().is_empty())
                .collect()
        };
        Self {
            tool_keywords: lower(tool_keywords),
            research_keywords: lower(research_keywords),
            connectors: lower(connectors),
            word_threshold,
        }
    }

    pub fn from_config(cfg: &RouterSection) -> Self {
        Self::new(
            cfg.tool_keywords.clone(),
            cfg.research_keywords.clone(),
            cfg.connectors.clone(),
            cfg.word_threshold,
        )
    }

    pub fn signals(&self, text: &str) -> RuleSignals {
        let content = text.to_lowercase();
        RuleSignals {
            has_tool: contains_any(&content, &self.tool_keywords),
            has_research: contains_any(&content, &self.research_keywords),
            has_connector: contains_any(&content, &self.connectors),
            word_count: text.split_whitespace().count(),
        }
    }

    /// 是否含工具关键词（Tool Handler 据此决定是否纠正重试）
    pub fn mentions_tool(&self, text: &str) -> bool {
        contains_any(&text.to_lowercase(), &self.tool_keywords)
    }

    pub fn decide(&self, text: &str) -> Option<RouteDecision> {
        let s = self.signals(text);
        if s.has_tool && s.has_research && s.has_connector {
            Some(RouteDecision::Orchestrator)
        } else if s.has_tool && !s.has_research && s.word_count < self.word_threshold {
            Some(RouteDecision::Tool)
        } else {
            None
        }
    }
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::from_config(&RouterSection::default())
    }
}

fn contains_any(content: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| content.contains(k.as_str()))
}
