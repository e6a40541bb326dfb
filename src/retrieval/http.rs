//! HTTP 搜索索引客户端
//!
//! POST `{"index", "query", "top_k"}` 到配置的端点，可选 `api-key` 头。
//! 响应接受 `{"results": [...]}`、`{"value": [...]}` 或直接的数组。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::retrieval::{RetrievalClient, RetrievalError, SearchHit};

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Results { results: Vec<SearchHit> },
    Value { value: Vec<SearchHit> },
    Bare(Vec<SearchHit>),
}

impl SearchResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        match self {
            SearchResponse::Results { results } => results,
            SearchResponse::Value { value } => value,
            SearchResponse::Bare(hits) => hits,
        }
    }
}

pub fn parse_search_response(body: &str) -> Result<Vec<SearchHit>, RetrievalError> {
    serde_json::from_str::<SearchResponse>(body)
        .map(SearchResponse::into_hits)
        .map_err(|e| RetrievalError::Malformed(e.to_string()))
}

pub struct HttpRetrievalClient {
    http: reqwest::Client,
    endpoint: String,
    index: Option<String>,
    api_key: Option<String>,
}

impl HttpRetrievalClient {
    pub fn new(
        endpoint: impl Into<String>,
        index: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            index,
            api_key,
        })
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let body = json!({
            "index": self.index,
            "query": query,
            "top_k": top_k,
        });
        let mut req = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RetrievalError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let mut hits = parse_search_response(&text)?;
        hits.truncate(top_k);
        tracing::debug!(query, hits = hits.len(), "search completed");
        Ok(hits)
    }
}
