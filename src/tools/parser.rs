//! 从 LLM 自由文本中提取工具调用
//!
//! 两遍：
//! 1. 去空白后整体是一个 JSON 对象，直接解析
//! 2. 否则用正则定位 `{ ... "tool" ... "arguments"` 的起点，再从起点在全文中做括号配对，
//!    找到真正的闭合 `}` 后解析（非嵌套正则会在第一个 `}` 处截断 arguments）
//!
//! 两遍都要求同时有 `tool`（非空字符串）与 `arguments`（对象），否则视为普通回答，返回 None。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// 一次工具调用请求
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

static CALL_SHAPE_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn call_shape_re() -> Option<&'static Regex> {
    CALL_SHAPE_RE
        .get_or_init(|| Regex::new(r#"(?s)\{[^{}]*"tool"[^{}]*"arguments""#).ok())
        .as_ref()
}

/// 工具调用解析器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolCallParser;

impl ToolCallParser {
    pub fn new() -> Self {
        Self
    }

    /// 解析失败不是错误：LLM 直接回答是常见且合法的结果
    pub fn parse(&self, output: &str) -> Option<ToolInvocationRequest> {
        let trimmed = output.trim();

        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            if let Some(call) = parse_candidate(trimmed) {
                tracing::debug!(tool = %call.tool_name, "[parse] whole-output tool call");
                return Some(call);
            }
        }

        let re = call_shape_re()?;
        for m in re.find_iter(output) {
            let Some(end) = matching_brace(output, m.start()) else {
                continue;
            };
            if let Some(call) = parse_candidate(&output[m.start()..=end]) {
                tracing::debug!(tool = %call.tool_name, "[parse] embedded tool call");
                return Some(call);
            }
        }
        None
    }
}

fn parse_candidate(json_str: &str) -> Option<ToolInvocationRequest> {
    let value: Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;
    let tool = obj.get("tool")?.as_str()?.trim();
    let arguments = obj.get("arguments")?.as_object()?;
    if tool.is_empty() {
        return None;
    }
    Some(ToolInvocationRequest::new(tool, arguments.clone()))
}

/// 从 `start`（必须是 `{`）开始配对，返回闭合 `}` 的字节下标；跳过字符串内的括号与转义
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}
