//! Hive - 多智能体对话编排核心
//!
//! 模块划分：
//! - **agent**: 运行时上下文（路由 → Handler，总时限，错误渲染）
//! - **agents**: Tool / Research / General / Orchestrator 四个 Handler
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与恢复策略
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 脱敏日志装饰器）
//! - **message**: 入站用户消息
//! - **observability**: tracing 初始化与日志脱敏
//! - **retrieval**: 检索后端（HTTP 索引 / 本地知识库）
//! - **router**: 关键词规则 + LLM 兜底的消息路由
//! - **tools**: Tool Call 解析、MCP 传输与带重试的工具调用客户端

pub mod agent;
pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod message;
pub mod observability;
pub mod retrieval;
pub mod router;
pub mod tools;

pub use agent::{AgentRuntime, AgentRuntimeBuilder};
pub use message::UserMessage;
pub use router::RouteDecision;
