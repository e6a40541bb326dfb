//! 分词与相似度（本地知识库检索用）
//!
//! 含 CJK 字符时用 jieba 搜索引擎模式分词，否则按非字母数字字符切分；统一小写，去掉单字符英文词与常见停用词。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

const STOPWORDS: &[&str] = &[
    "the", "is", "are", "was", "what", "and", "or", "of", "to", "in", "on", "for", "an", "it",
    "me", "about", "can", "you", "do", "does",
];

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}' |
        '\u{AC00}'..='\u{D7AF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn keep(token: &str) -> bool {
    let mut chars = token.chars();
    let first = chars.next();
    let multi = chars.next().is_some();
    match first {
        None => false,
        Some(c) if is_cjk(c) => true,
        Some(c) => (multi || c.is_ascii_digit()) && !STOPWORDS.contains(&token),
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| s.chars().any(char::is_alphanumeric) && keep(s))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(|s| s.to_lowercase())
            .filter(|s| keep(s))
            .collect()
    }
}

/// 分词并返回词集合
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard 相似度
pub fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    let union = set1.union(set2).count() as f32;
    intersection / union
}

/// 交集大小
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}
