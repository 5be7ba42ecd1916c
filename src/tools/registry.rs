//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时并统一转 AgentError。
//! 部分工具不供模型调用，而是在生成前向 system 指令注入内容（如 preload_memory）。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具调用时的上下文：会话标识、所属阶段、当前用户输入
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub stage: String,
    /// 本轮用户输入（preload_memory 以此检索）
    pub user_query: String,
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否出现在模型可调用的工具列表中
    fn is_model_callable(&self) -> bool {
        true
    }

    /// 生成前的请求处理：返回需要追加到 system 指令的文本
    async fn process_request(&self, _ctx: &ToolContext) -> Result<Option<String>, String> {
        Ok(None)
    }

    /// 执行工具
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（有序，保证 prompt 稳定）
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 模型可调用的工具
    pub fn get_callable(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.get(name).filter(|t| t.is_model_callable())
    }

    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let tool = self
            .get_callable(name)
            .ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args, ctx).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 所有工具（含请求处理类）
    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    /// 返回模型可调用工具的 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .filter(|(_, tool)| tool.is_model_callable())
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    /// 模型可调用工具的 schema JSON
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .filter(|(_, tool)| tool.is_model_callable())
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo text"
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, String> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct Hidden;

    #[async_trait]
    impl Tool for Hidden {
        fn name(&self) -> &str {
            "hidden"
        }
        fn description(&self) -> &str {
            "Not for the model"
        }
        fn is_model_callable(&self) -> bool {
            false
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
            Ok("should not run".into())
        }
    }

    #[tokio::test]
    async fn test_execute_and_hidden_tools() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo);
        reg.register(Hidden);
        let ctx = ToolContext::default();

        let out = reg
            .execute("echo", serde_json::json!({"text": "hi"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "hi");
        assert!(reg.execute("hidden", Value::Null, &ctx).await.is_err());
        assert!(reg.execute("missing", Value::Null, &ctx).await.is_err());

        let names: Vec<String> = reg.tool_descriptions().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["echo".to_string()]);
        assert_eq!(reg.tool_names().len(), 2);
        assert!(reg.to_schema_json().contains("\"echo\""));
        assert!(!reg.to_schema_json().contains("hidden"));
    }
}
