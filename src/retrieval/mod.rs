//! 检索层：知识库查询抽象与实现
//!
//! - `HttpRetrievalClient`：远程搜索索引（JSON over HTTP）
//! - `KnowledgeBase`：从 JSON 文件加载的内存知识库，按词重叠打分
//!
//! 检索结果按后端返回顺序（相关度降序）使用，不缓存。

pub mod http;
pub mod memory;
pub mod tokenizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpRetrievalClient;
pub use memory::KnowledgeBase;

/// 检索失败
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("search request failed: {0}")]
    Request(String),

    #[error("search backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed search response: {0}")]
    Malformed(String),

    #[error("knowledge base error: {0}")]
    KnowledgeBase(String),
}

impl From<reqwest::Error> for RetrievalError {
    fn from(e: reqwest::Error) -> Self {
        RetrievalError::Request(e.to_string())
    }
}

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "@search.score", alias = "relevance_score")]
    pub score: f32,
}

#[async_trait]
pub trait RetrievalClient: Send + Sync {
    /// 空结果是合法返回，不是错误
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, RetrievalError>;
}
