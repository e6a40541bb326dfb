//! Prompt / 回复日志脱敏
//!
//! - off：不处理
//! - standard：邮箱替换为 `[EMAIL]`，超过 2000 字符截断并追加 `...[TRUNC]`
//! - strict：standard 基础上，UUID 替换为 `[UUID]`，5 位以上数字替换为 `[NUMBER]`
//!
//! 正则编译失败时原样返回（fail open），日志不应因脱敏而丢失。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

const MAX_LEN: usize = 2000;

static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
static LONG_NUMBER_RE: OnceLock<Option<Regex>> = OnceLock::new();
static UUID_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn email_re() -> Option<&'static Regex> {
    EMAIL_RE
        .get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+").ok())
        .as_ref()
}

fn long_number_re() -> Option<&'static Regex> {
    LONG_NUMBER_RE
        .get_or_init(|| Regex::new(r"\b\d{5,}\b").ok())
        .as_ref()
}

fn uuid_re() -> Option<&'static Regex> {
    UUID_RE
        .get_or_init(|| {
            Regex::new(
                r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
            )
            .ok()
        })
        .as_ref()
}

/// 脱敏级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskingMode {
    Off,
    #[default]
    Standard,
    Strict,
}

impl MaskingMode {
    /// 按级别脱敏
    pub fn apply(self, text: &str) -> String {
        match self {
            MaskingMode::Off => text.to_string(),
            MaskingMode::Standard => apply_standard(text),
            MaskingMode::Strict => apply_strict(text),
        }
    }
}

fn apply_standard(text: &str) -> String {
    let mut out = match email_re() {
        Some(re) => re.replace_all(text, "[EMAIL]").into_owned(),
        None => text.to_string(),
    };
    if out.chars().count() > MAX_LEN {
        out = out.chars().take(MAX_LEN).collect::<String>();
        out.push_str("...[TRUNC]");
    }
    out
}

fn apply_strict(text: &str) -> String {
    let mut out = apply_standard(text);
    // UUID 先于长数字，否则 UUID 末段的 12 位数字会被先行替换
    if let Some(re) = uuid_re() {
        out = re.replace_all(&out, "[UUID]").into_owned();
    }
    if let Some(re) = long_number_re() {
        out = re.replace_all(&out, "[NUMBER]").into_owned();
    }
    out
}
