//! 工具结果转为面向用户的文本
//!
//! 字符串结果若本身是 JSON 对象 / 数组则先解码；对象与数组美化输出，其它原样输出。
//! 已知工具加前缀标签，未知工具只输出结果本身。

use serde_json::Value;

/// 已知工具的结果标签
fn label_for(tool_name: &str) -> Option<&'static str> {
    match tool_name {
        "calculate" => Some("Calculation result"),
        "get_weather" => Some("Weather"),
        "get_current_time" => Some("Current time"),
        "generate_random_number" => Some("Random number"),
        _ => None,
    }
}

/// 结果值的文本形式
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(inner @ (Value::Object(_) | Value::Array(_))) => pretty(&inner),
            _ => s.clone(),
        },
        Value::Object(_) | Value::Array(_) => pretty(value),
        other => other.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn format_tool_result(tool_name: &str, value: &Value) -> String {
    let rendered = render_value(value);
    match label_for(tool_name) {
        Some(label) => format!("{label}: {rendered}"),
        None => rendered,
    }
}
