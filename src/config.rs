//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__TOOLS__MCP_ENDPOINT=http://localhost:8000`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::observability::masking::MaskingMode;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub router: RouterSection,
    pub tools: ToolsSection,
    pub search: SearchSection,
    pub observability: ObservabilitySection,
}

/// [app] 段：应用名与单次请求总时限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单次 handle() 的总时限（秒），0 表示不限制
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 需要 OPENAI_API_KEY，缺失时回退 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

/// [router] 段：关键词规则与字数阈值
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSection {
    #[serde(default = "default_tool_keywords")]
    pub tool_keywords: Vec<String>,
    #[serde(default = "default_research_keywords")]
    pub research_keywords: Vec<String>,
    /// 连接词，前后带空格以免命中单词内部（如 "brand"）
    #[serde(default = "default_connectors")]
    pub connectors: Vec<String>,
    /// 仅含工具关键词时，字数小于该值才直接走 Tool
    #[serde(default = "default_word_threshold")]
    pub word_threshold: usize,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            tool_keywords: default_tool_keywords(),
            research_keywords: default_research_keywords(),
            connectors: default_connectors(),
            word_threshold: default_word_threshold(),
        }
    }
}

fn default_tool_keywords() -> Vec<String> {
    vec![
        "weather".into(),
        "calculate".into(),
        "time".into(),
        "random".into(),
    ]
}

fn default_research_keywords() -> Vec<String> {
    vec![
        "what is".into(),
        "explain".into(),
        "how".into(),
        "mcp".into(),
        "rag".into(),
        "agent".into(),
        "protocol".into(),
    ]
}

fn default_connectors() -> Vec<String> {
    vec![" and ".into(), " also ".into(), " plus ".into()]
}

fn default_word_threshold() -> usize {
    15
}

/// 工具会话策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// 每次 Tool Handler 调用都重新初始化会话（长时间运行的进程推荐）
    #[default]
    ReinitializeEachCall,
    /// 首次使用时初始化，之后复用，仅在会话失效时重建
    Lazy,
}

/// [tools] 段：MCP 端点、超时、重试
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// MCP 服务器根地址（如 http://localhost:8000），未配置时 Tool Agent 禁用
    pub mcp_endpoint: Option<String>,
    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 指数退避基数（毫秒）：第 n 次重试前等待 base * 2^n
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default)]
    pub session_policy: SessionPolicy,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            mcp_endpoint: None,
            timeout_secs: default_tool_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            session_policy: SessionPolicy::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

/// [search] 段：检索后端（HTTP 索引或本地知识库 JSON，二选一，HTTP 优先）
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    pub endpoint: Option<String>,
    pub index: Option<String>,
    /// 未设置时读取环境变量 HIVE_SEARCH_API_KEY
    pub api_key: Option<String>,
    pub knowledge_base_path: Option<PathBuf>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_citation_footer")]
    pub citation_footer: bool,
    /// 每个来源写入 Prompt 的最大字符数
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            index: None,
            api_key: None,
            knowledge_base_path: None,
            top_k: default_top_k(),
            citation_footer: default_citation_footer(),
            excerpt_chars: default_excerpt_chars(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_citation_footer() -> bool {
    true
}

fn default_excerpt_chars() -> usize {
    800
}

fn default_search_timeout_secs() -> u64 {
    15
}

/// [observability] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObservabilitySection {
    #[serde(default)]
    pub masking_mode: MaskingMode,
    /// 是否在 debug 日志中记录（脱敏后的）Prompt 与回复
    #[serde(default)]
    pub log_prompts: bool,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.router.word_threshold, 15);
        assert!(cfg.router.tool_keywords.contains(&"weather".to_string()));
        assert!(cfg.router.connectors.contains(&" and ".to_string()));
        assert_eq!(cfg.tools.max_retries, 3);
        assert_eq!(cfg.tools.session_policy, SessionPolicy::ReinitializeEachCall);
        assert!(cfg.tools.mcp_endpoint.is_none());
        assert_eq!(cfg.search.top_k, 5);
        assert!(cfg.search.citation_footer);
        assert_eq!(cfg.observability.masking_mode, MaskingMode::Standard);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[router]
word_threshold = 8
tool_keywords = ["forecast"]

[tools]
mcp_endpoint = "http://localhost:8000"
max_retries = 5
session_policy = "lazy"

[search]
top_k = 3
citation_footer = false

[observability]
masking_mode = "strict"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.router.word_threshold, 8);
        assert_eq!(cfg.router.tool_keywords, vec!["forecast".to_string()]);
        // 未写入的键保持默认
        assert_eq!(cfg.router.research_keywords.len(), 7);
        assert_eq!(cfg.tools.mcp_endpoint.as_deref(), Some("http://localhost:8000"));
        assert_eq!(cfg.tools.max_retries, 5);
        assert_eq!(cfg.tools.session_policy, SessionPolicy::Lazy);
        assert_eq!(cfg.tools.timeout_secs, 30);
        assert_eq!(cfg.search.top_k, 3);
        assert!(!cfg.search.citation_footer);
        assert_eq!(cfg.observability.masking_mode, MaskingMode::Strict);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/hive.toml"))).unwrap();
        assert_eq!(cfg.tools.backoff_base_ms, 1000);
        assert_eq!(cfg.app.request_timeout_secs, 120);
    }
}
