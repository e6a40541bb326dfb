//! 内存知识库
//!
//! 从 JSON 文件加载文档数组 `[{id, title, content, category, ...}]`，查询时按
//! Jaccard(查询, 标题+正文) + 标题命中加权 打分，过滤 0 分后降序取 top_k。

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::retrieval::tokenizer::{jaccard_similarity, overlap_score, tokenize_to_set};
use crate::retrieval::{RetrievalClient, RetrievalError, SearchHit};

/// 标题命中的权重（乘以命中比例）
const TITLE_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
}

struct IndexedDocument {
    doc: Document,
    title_tokens: HashSet<String>,
    all_tokens: HashSet<String>,
}

pub struct KnowledgeBase {
    docs: Vec<IndexedDocument>,
}

impl KnowledgeBase {
    pub fn new(documents: Vec<Document>) -> Self {
        let docs = documents
            .into_iter()
            .map(|doc| {
                let title_tokens = tokenize_to_set(&doc.title);
                let mut all_tokens = tokenize_to_set(&doc.content);
                all_tokens.extend(title_tokens.iter().cloned());
                IndexedDocument {
                    doc,
                    title_tokens,
                    all_tokens,
                }
            })
            .collect();
        Self { docs }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RetrievalError> {
        let documents: Vec<Document> = serde_json::from_str(json)
            .map_err(|e| RetrievalError::KnowledgeBase(e.to_string()))?;
        Ok(Self::new(documents))
    }

    pub fn load(path: &Path) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::KnowledgeBase(format!("{}: {}", path.display(), e)))?;
        let kb = Self::from_json_str(&raw)?;
        tracing::info!("Loaded {} knowledge base documents from {}", kb.len(), path.display());
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// 同步检索
    pub fn query(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let q = tokenize_to_set(query);
        if q.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f32, &Document)> = self
            .docs
            .iter()
            .filter_map(|d| {
                let body = jaccard_similarity(&q, &d.all_tokens);
                let title = overlap_score(&q, &d.title_tokens) as f32 / q.len() as f32;
                let score = body + TITLE_WEIGHT * title;
                (score > 0.0).then_some((score, &d.doc))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, doc)| SearchHit {
                id: doc.id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
                category: doc.category.clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl RetrievalClient for KnowledgeBase {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        Ok(self.query(query, top_k))
    }
}
