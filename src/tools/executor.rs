//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolContext, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args, ctx)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "stage": ctx.stage,
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 依次运行请求处理类工具，收集要注入 system 指令的文本；单个失败只记日志
    pub async fn preprocess(&self, ctx: &ToolContext) -> Vec<String> {
        let mut sections = Vec::new();
        for tool in self.registry.tools() {
            match timeout(self.timeout, tool.process_request(ctx)).await {
                Ok(Ok(Some(text))) if !text.trim().is_empty() => sections.push(text),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(tool = %tool.name(), stage = %ctx.stage, "request processing failed: {}", e)
                }
                Err(_) => {
                    tracing::warn!(tool = %tool.name(), stage = %ctx.stage, "request processing timed out")
                }
            }
        }
        sections
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn has_callable_tools(&self) -> bool {
        !self.registry.tool_descriptions().is_empty()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String, String> {
            Err("nope".into())
        }
    }

    #[tokio::test]
    async fn test_timeout_and_failure_mapping() {
        let mut reg = ToolRegistry::new();
        reg.register(Slow);
        reg.register(Failing);
        let exec = ToolExecutor::new(reg, 30).with_timeout(Duration::from_millis(20));
        let ctx = ToolContext::default();

        let err = exec.execute("slow", Value::Null, &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref t) if t == "slow"));

        let err = exec.execute("failing", Value::Null, &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(ref m) if m == "nope"));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({ "q": "x".repeat(500) });
        assert!(args_preview(&long).ends_with("..."));
    }
}
