//! 工具调用：LLM 输出解析、MCP 传输、会话与重试状态机、结果格式化

pub mod client;
pub mod format;
pub mod mcp;
pub mod mock;
pub mod parser;
pub mod retry;
pub mod transport;

pub use client::{SessionPhase, SessionState, ToolInvocationClient};
pub use format::format_tool_result;
pub use mcp::McpTransport;
pub use mock::{MockTransport, RecordedCall};
pub use parser::{ToolCallParser, ToolInvocationRequest};
pub use retry::RetryPolicy;
pub use transport::{SessionHandshake, ToolDescriptor, ToolTransport};
