//! 检索 Handler（RAG）
//!
//! 检索 top_k 条来源：
//! - 有结果：每条来源写成 `[Source N]` 块（标题 / 分类 / ID / 摘录 / 分数），要求 LLM 用 `[Source N]` 引用
//! - 无结果：要求 LLM 用通用知识作答，并说明知识库中没有相关内容
//!
//! 回答开头的 `[RAG-based Answer]` / `[General Knowledge]` 标记由指令约束，不做事后改写。
//! 开启 citation_footer 时，在回答后追加确定性的来源列表，保证来源标题一定可见。

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Handler;
use crate::config::SearchSection;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::message::UserMessage;
use crate::retrieval::{RetrievalClient, SearchHit};

pub const RAG_TAG: &str = "[RAG-based Answer]";
pub const GENERAL_KNOWLEDGE_TAG: &str = "[General Knowledge]";

const RESEARCH_SYSTEM_PROMPT: &str = "You are a research assistant backed by a knowledge base.
Always begin your answer with exactly one of these tags:
- \"[RAG-based Answer]\" if your answer is based on the provided knowledge base sources
- \"[General Knowledge]\" if the knowledge base has nothing relevant and you rely on general knowledge";

pub struct ResearchHandler {
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<dyn RetrievalClient>,
    top_k: usize,
    citation_footer: bool,
    excerpt_chars: usize,
}

impl ResearchHandler {
    pub fn new(llm: Arc<dyn LlmClient>, retrieval: Arc<dyn RetrievalClient>) -> Self {
        let defaults = SearchSection::default();
        Self {
            llm,
            retrieval,
            top_k: defaults.top_k,
            citation_footer: defaults.citation_footer,
            excerpt_chars: defaults.excerpt_chars,
        }
    }

    pub fn from_config(
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<dyn RetrievalClient>,
        cfg: &SearchSection,
    ) -> Self {
        Self::new(llm, retrieval)
            .with_top_k(cfg.top_k)
            .with_citation_footer(cfg.citation_footer)
            .with_excerpt_chars(cfg.excerpt_chars)
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_citation_footer(mut self, enabled: bool) -> Self {
        self.citation_footer = enabled;
        self
    }

    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    fn grounded_prompt(&self, question: &str, hits: &[SearchHit]) -> String {
        let mut prompt = String::from("Answer the question using the knowledge base sources below.\n\n");
        for (i, hit) in hits.iter().enumerate() {
            let _ = write!(
                prompt,
                "[Source {}]\nTitle: {}\nCategory: {}\nID: {}\nContent: {}\nScore: {:.2}\n\n",
                i + 1,
                hit.title,
                hit.category,
                hit.id,
                excerpt(&hit.content, self.excerpt_chars),
                hit.score
            );
        }
        let _ = write!(
            prompt,
            "Question: {question}\n\n\
             Start with {RAG_TAG}. Cite the sources you use inline as [Source N]."
        );
        prompt
    }
}

fn general_knowledge_prompt(question: &str) -> String {
    format!(
        "The knowledge base returned no relevant documents for this question.\n\n\
         Question: {question}\n\n\
         Start with {GENERAL_KNOWLEDGE_TAG}, say that the knowledge base had nothing relevant, \
         then answer from general knowledge."
    )
}

/// 确定性的来源列表
pub fn citation_footer(hits: &[SearchHit]) -> String {
    let mut footer = String::from("Sources:");
    for (i, hit) in hits.iter().enumerate() {
        let _ = write!(
            footer,
            "\n[Source {}] {} (id: {}, score: {:.2})",
            i + 1,
            hit.title,
            hit.id,
            hit.score
        );
    }
    footer
}

/// 按字符截断，超出时追加省略号
fn excerpt(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let mut s: String = content.chars().take(max_chars).collect();
        s.push_str("...");
        s
    }
}

#[async_trait]
impl Handler for ResearchHandler {
    fn name(&self) -> &'static str {
        "Research Agent"
    }

    fn phase(&self) -> &'static str {
        "research"
    }

    async fn run(&self, message: &UserMessage) -> Result<String, AgentError> {
        let hits = self.retrieval.search(&message.text, self.top_k).await?;
        tracing::info!(hits = hits.len(), top_k = self.top_k, "[research] retrieved");

        let prompt = if hits.is_empty() {
            general_knowledge_prompt(&message.text)
        } else {
            self.grounded_prompt(&message.text, &hits)
        };
        let answer = self.llm.generate(RESEARCH_SYSTEM_PROMPT, &prompt).await?;
        let answer = answer.trim().to_string();

        if self.citation_footer && !hits.is_empty() {
            Ok(format!("{answer}\n\n{}", citation_footer(&hits)))
        } else {
            Ok(answer)
        }
    }
}
