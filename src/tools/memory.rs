//! 记忆工具
//!
//! - preload_memory：不供模型调用；每次生成前以本轮用户输入检索长期记忆，把命中内容注入 system 指令
//! - load_memory：模型主动检索长期记忆

use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::memory::{MemoryEntry, MemoryService};
use crate::tools::{Tool, ToolContext};

/// 单条记忆在注入时的最大字符数
const MAX_ENTRY_CHARS: usize = 1200;

fn format_entries(entries: &[MemoryEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let content: String = e.content.chars().take(MAX_ENTRY_CHARS).collect();
            format!(
                "Time: {}\n{}: {}",
                e.timestamp.format("%Y-%m-%d %H:%M"),
                e.author,
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 生成前预载相关记忆
pub struct PreloadMemoryTool {
    memory: Arc<dyn MemoryService>,
    top_k: usize,
}

impl PreloadMemoryTool {
    pub fn new(memory: Arc<dyn MemoryService>, top_k: usize) -> Self {
        Self { memory, top_k }
    }
}

#[async_trait]
impl Tool for PreloadMemoryTool {
    fn name(&self) -> &str {
        "preload_memory"
    }

    fn description(&self) -> &str {
        "Loads memories relevant to the current user message into the instructions before generation."
    }

    fn is_model_callable(&self) -> bool {
        false
    }

    async fn process_request(&self, ctx: &ToolContext) -> Result<Option<String>, String> {
        if !self.memory.enabled() || ctx.user_query.trim().is_empty() {
            return Ok(None);
        }
        let entries = self
            .memory
            .search_memory(&ctx.app_name, &ctx.user_id, &ctx.user_query, self.top_k)
            .await
            .map_err(|e| e.to_string())?;
        if entries.is_empty() {
            return Ok(None);
        }
        tracing::debug!(stage = %ctx.stage, hits = entries.len(), "preloaded memory");
        Ok(Some(format!(
            "The following content is from your previous conversations with the user.\n\
             They may be useful for answering the user's current query.\n\
             <PAST_CONVERSATIONS>\n{}\n</PAST_CONVERSATIONS>",
            format_entries(&entries)
        )))
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
        Err("preload_memory is applied automatically and cannot be called".to_string())
    }
}

/// load_memory 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadMemoryArgs {
    /// 检索关键词
    pub query: String,
}

/// 模型主动检索长期记忆
pub struct LoadMemoryTool {
    memory: Arc<dyn MemoryService>,
    top_k: usize,
}

impl LoadMemoryTool {
    pub fn new(memory: Arc<dyn MemoryService>, top_k: usize) -> Self {
        Self { memory, top_k }
    }
}

#[async_trait]
impl Tool for LoadMemoryTool {
    fn name(&self) -> &str {
        "load_memory"
    }

    fn description(&self) -> &str {
        "Search memories of previous conversations with this user. Args: {\"query\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(LoadMemoryArgs)).unwrap_or(Value::Null)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let args: LoadMemoryArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;
        let entries = self
            .memory
            .search_memory(&ctx.app_name, &ctx.user_id, &args.query, self.top_k)
            .await
            .map_err(|e| e.to_string())?;
        if entries.is_empty() {
            Ok("No relevant memories found.".to_string())
        } else {
            Ok(format_entries(&entries))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMemoryService;
    use crate::session::{Session, SessionEvent, SessionKey};

    async fn seeded() -> Arc<dyn MemoryService> {
        let memory = Arc::new(InMemoryMemoryService::default());
        let mut s = Session::new(SessionKey::new("app", "u", "old"));
        s.events.push(SessionEvent::user("I am a Product Manager interested in Data Science"));
        memory.add_session_to_memory(&s).await.unwrap();
        memory
    }

    fn ctx(query: &str) -> ToolContext {
        ToolContext {
            app_name: "app".into(),
            user_id: "u".into(),
            session_id: "new".into(),
            stage: "research_agent".into(),
            user_query: query.into(),
        }
    }

    #[tokio::test]
    async fn test_preload_injects_past_conversations() {
        let tool = PreloadMemoryTool::new(seeded().await, 3);
        let text = tool
            .process_request(&ctx("What about data science bootcamps?"))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("<PAST_CONVERSATIONS>"));
        assert!(text.contains("Product Manager"));
        assert!(!tool.is_model_callable());
    }

    #[tokio::test]
    async fn test_preload_without_hits_adds_nothing() {
        let tool = PreloadMemoryTool::new(seeded().await, 3);
        assert!(tool.process_request(&ctx("gardening")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_memory() {
        let tool = LoadMemoryTool::new(seeded().await, 3);
        let out = tool
            .execute(serde_json::json!({"query": "product manager"}), &ctx(""))
            .await
            .unwrap();
        assert!(out.contains("user: I am a Product Manager"));
        let none = tool
            .execute(serde_json::json!({"query": "astronomy"}), &ctx(""))
            .await
            .unwrap();
        assert_eq!(none, "No relevant memories found.");
    }
}
