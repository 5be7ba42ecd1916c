//! 指令模板：`{key}` 替换为会话中的命名输出，`{key?}` 缺失时渲染为空
//!
//! 只有标识符形式的花括号才是占位符，其余花括号（如 JSON 示例）原样保留。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::core::AgentError;

/// 模板中的一个占位符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub key: String,
    pub optional: bool,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(\?)?\}")
            .unwrap_or_else(|e| panic!("invalid placeholder regex: {e}"))
    })
}

/// 按出现顺序列出占位符（去重）
pub fn placeholders(template: &str) -> Vec<Placeholder> {
    let mut out: Vec<Placeholder> = Vec::new();
    for caps in placeholder_regex().captures_iter(template) {
        let p = Placeholder {
            key: caps[1].to_string(),
            optional: caps.get(2).is_some(),
        };
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// 渲染模板；必填占位符无值时返回 MissingTemplateValue
pub fn render(
    template: &str,
    values: &BTreeMap<String, String>,
    stage: &str,
) -> Result<String, AgentError> {
    let mut missing: Option<String> = None;
    let rendered = placeholder_regex().replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        match values.get(key) {
            Some(v) => v.clone(),
            None if caps.get(2).is_some() => String::new(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(AgentError::MissingTemplateValue {
            stage: stage.to_string(),
            key,
        }),
        None => Ok(rendered.into_owned()),
    }
}
