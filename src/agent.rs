//! Agent 运行时
//!
//! 进程启动时构建一次的上下文对象：持有 Router 与四个 Handler，显式传递，不使用全局单例。
//! `handle` 对单条用户输入完成一次 路由 → Handler 的处理并返回文本；它不会失败，
//! 所有错误都转为 "Error in <phase>: <message>"。可选的请求总时限通过 `tokio::time::timeout` 施加。

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::agents::{
    DisabledHandler, GeneralHandler, Handler, OrchestratorHandler, ResearchHandler, ToolHandler,
};
use crate::config::{AppConfig, SearchSection, SessionPolicy};
use crate::core::AgentError;
use crate::llm::{create_llm_from_config, LlmClient, LoggingLlmClient};
use crate::message::UserMessage;
use crate::retrieval::{HttpRetrievalClient, KnowledgeBase, RetrievalClient};
use crate::router::{KeywordRules, RouteDecision, Router};
use crate::tools::{McpTransport, RetryPolicy, ToolInvocationClient, ToolTransport};

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    router: Router,
    tool: Arc<dyn Handler>,
    research: Arc<dyn Handler>,
    general: Arc<dyn Handler>,
    orchestrator: Arc<dyn Handler>,
    tool_client: Option<Arc<ToolInvocationClient>>,
    request_timeout: Option<Duration>,
}

/// 运行时构建器：测试中用它注入 Mock 客户端，生产中由 `from_config` 使用
pub struct AgentRuntimeBuilder {
    llm: Arc<dyn LlmClient>,
    rules: KeywordRules,
    tool_client: Option<Arc<ToolInvocationClient>>,
    session_policy: SessionPolicy,
    retrieval: Option<Arc<dyn RetrievalClient>>,
    search: SearchSection,
    request_timeout: Option<Duration>,
}

impl AgentRuntimeBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            rules: KeywordRules::default(),
            tool_client: None,
            session_policy: SessionPolicy::default(),
            retrieval: None,
            search: SearchSection::default(),
            request_timeout: None,
        }
    }

    pub fn rules(mut self, rules: KeywordRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn tool_client(mut self, client: Arc<ToolInvocationClient>) -> Self {
        self.tool_client = Some(client);
        self
    }

    /// 以给定传输与重试策略创建 ToolInvocationClient
    pub fn tool_transport(self, transport: Arc<dyn ToolTransport>, policy: RetryPolicy) -> Self {
        self.tool_client(Arc::new(ToolInvocationClient::new(transport, policy)))
    }

    pub fn session_policy(mut self, policy: SessionPolicy) -> Self {
        self.session_policy = policy;
        self
    }

    pub fn retrieval(mut self, retrieval: Arc<dyn RetrievalClient>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn search_options(mut self, search: SearchSection) -> Self {
        self.search = search;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> AgentRuntime {
        let tool: Arc<dyn Handler> = match &self.tool_client {
            Some(client) => Arc::new(ToolHandler::new(
                self.llm.clone(),
                client.clone(),
                self.rules.clone(),
                self.session_policy,
            )),
            None => Arc::new(DisabledHandler::tool()),
        };
        let research: Arc<dyn Handler> = match self.retrieval {
            Some(retrieval) => Arc::new(ResearchHandler::from_config(
                self.llm.clone(),
                retrieval,
                &self.search,
            )),
            None => Arc::new(DisabledHandler::research()),
        };
        let general: Arc<dyn Handler> = Arc::new(GeneralHandler::new(self.llm.clone()));
        let orchestrator: Arc<dyn Handler> =
            Arc::new(OrchestratorHandler::new(tool.clone(), research.clone()));

        AgentRuntime {
            router: Router::new(self.rules, self.llm.clone()),
            llm: self.llm,
            tool,
            research,
            general,
            orchestrator,
            tool_client: self.tool_client,
            request_timeout: self.request_timeout,
        }
    }
}

impl AgentRuntime {
    pub fn builder(llm: Arc<dyn LlmClient>) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(llm)
    }

    /// 按配置构建：LLM（带脱敏日志）、MCP 工具客户端、检索后端；未配置的后端对应 Handler 被禁用
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm: Arc<dyn LlmClient> = Arc::new(LoggingLlmClient::new(
            create_llm_from_config(cfg),
            cfg.observability.masking_mode,
            cfg.observability.log_prompts,
        ));

        let mut builder = Self::builder(llm)
            .rules(KeywordRules::from_config(&cfg.router))
            .session_policy(cfg.tools.session_policy)
            .search_options(cfg.search.clone())
            .request_timeout(
                (cfg.app.request_timeout_secs > 0)
                    .then(|| Duration::from_secs(cfg.app.request_timeout_secs)),
            );

        match cfg.tools.mcp_endpoint.as_deref() {
            Some(endpoint) => {
                let transport = McpTransport::new(endpoint, Duration::from_secs(cfg.tools.timeout_secs))
                    .map_err(|e| AgentError::Config(format!("MCP transport: {e}")))?;
                tracing::info!("Tool Agent enabled (MCP endpoint {})", transport.endpoint());
                let client = Arc::new(ToolInvocationClient::new(
                    Arc::new(transport),
                    RetryPolicy::new(cfg.tools.max_retries, cfg.tools.backoff_base_ms),
                ));
                // 启动时先建一次会话；失败不致命，首次调用时会再试
                if let Err(e) = client.initialize().await {
                    tracing::warn!("Initial MCP session failed: {}", e);
                }
                builder = builder.tool_client(client);
            }
            None => tracing::warn!("Tool Agent disabled: no MCP endpoint configured"),
        }

        if let Some(retrieval) = build_retrieval(&cfg.search)? {
            builder = builder.retrieval(retrieval);
        } else {
            tracing::warn!("Research Agent disabled: no search endpoint or knowledge base configured");
        }

        Ok(builder.build())
    }

    /// 处理一条用户输入；永不失败
    pub async fn handle(&self, text: &str) -> String {
        self.handle_message(UserMessage::new(text)).await
    }

    pub async fn handle_message(&self, message: UserMessage) -> String {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("handle", %request_id);

        async {
            let started = std::time::Instant::now();
            let reply = match self.request_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.dispatch(&message)).await {
                    Ok(reply) => reply,
                    Err(_) => {
                        let err = AgentError::DeadlineExceeded(limit);
                        tracing::error!("Request aborted: {}", err);
                        format!("Error in request: {err}")
                    }
                },
                None => self.dispatch(&message).await,
            };
            tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "request finished");
            reply
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, message: &UserMessage) -> String {
        let decision = match self.router.classify(message).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!("Router error: {}", e);
                return format!("Error in routing: {e}");
            }
        };

        let handler = self.handler_for(decision);
        match handler.run(message).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("{} error: {}", handler.name(), e);
                format!("Error in {}: {}", handler.phase(), e)
            }
        }
    }

    fn handler_for(&self, decision: RouteDecision) -> &Arc<dyn Handler> {
        match decision {
            RouteDecision::Tool => &self.tool,
            RouteDecision::Research => &self.research,
            RouteDecision::General => &self.general,
            RouteDecision::Orchestrator => &self.orchestrator,
        }
    }

    /// 进程退出前调用一次：释放工具会话，记录累计 token 用量
    pub async fn shutdown(&self) {
        if let Some(client) = &self.tool_client {
            if let Err(e) = client.close().await {
                tracing::warn!("Tool session close failed: {}", e);
            }
        }
        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::info!(
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "Agent runtime shut down"
        );
    }
}

/// HTTP 索引优先，其次本地知识库文件；都没配置返回 None
fn build_retrieval(cfg: &SearchSection) -> Result<Option<Arc<dyn RetrievalClient>>, AgentError> {
    if let Some(endpoint) = &cfg.endpoint {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("HIVE_SEARCH_API_KEY").ok());
        let client = HttpRetrievalClient::new(
            endpoint.clone(),
            cfg.index.clone(),
            api_key,
            Duration::from_secs(cfg.timeout_secs),
        )
        .map_err(|e| AgentError::Config(format!("search client: {e}")))?;
        tracing::info!("Research Agent enabled (search endpoint {})", endpoint);
        return Ok(Some(Arc::new(client)));
    }
    if let Some(path) = &cfg.knowledge_base_path {
        let kb = KnowledgeBase::load(path).map_err(|e| AgentError::Config(e.to_string()))?;
        return Ok(Some(Arc::new(kb)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    #[tokio::test]
    async fn test_routing_failure_is_rendered() {
        let llm = Arc::new(ScriptedLlmClient::new().push_error(LlmError::Request("503".into())));
        let rt = AgentRuntime::builder(llm).build();
        let out = rt.handle("Hello").await;
        assert_eq!(out, "Error in routing: LLM request failed: 503");
    }

    #[tokio::test]
    async fn test_handler_failure_is_rendered_with_phase() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .push_text("general")
                .push_error(LlmError::Timeout(60)),
        );
        let rt = AgentRuntime::builder(llm).build();
        let out = rt.handle("Hello").await;
        assert_eq!(
            out,
            "Error in general conversation: LLM request timed out after 60s"
        );
    }

    #[tokio::test]
    async fn test_disabled_tool_route() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let rt = AgentRuntime::builder(llm.clone()).build();
        let out = rt.handle("weather in Seoul?").await;
        assert_eq!(out, crate::agents::TOOL_NOT_CONFIGURED);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_request_deadline() {
        let llm = Arc::new(
            ScriptedLlmClient::from_fn(|_| Ok("general".into()))
                .with_delay(Duration::from_millis(300)),
        );
        let rt = AgentRuntime::builder(llm)
            .request_timeout(Some(Duration::from_millis(50)))
            .build();
        let out = rt.handle("Hello").await;
        assert_eq!(out, "Error in request: deadline of 50ms exceeded");
    }

    #[tokio::test]
    async fn test_from_config_with_knowledge_base_and_mock_llm() {
        use std::io::Write;

        let mut kb = tempfile::NamedTempFile::new().unwrap();
        kb.write_all(br#"[{"id": "d1", "title": "RAG", "content": "retrieval augmented generation", "category": "c"}]"#)
            .unwrap();
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.search.knowledge_base_path = Some(kb.path().to_path_buf());

        let rt = AgentRuntime::from_config(&cfg).await.unwrap();
        // Mock LLM 对路由请求回答 general
        let out = rt.handle("Hello").await;
        assert_eq!(out, "Echo from Mock: Hello");
        rt.shutdown().await;
    }

    #[tokio::test]
    async fn test_from_config_missing_knowledge_base_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.search.knowledge_base_path = Some("/nonexistent/kb.json".into());
        assert!(matches!(
            AgentRuntime::from_config(&cfg).await,
            Err(AgentError::Config(_))
        ));
    }
}
