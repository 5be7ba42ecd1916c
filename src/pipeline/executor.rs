//! 单阶段执行：渲染指令 -> 预处理工具注入 -> 组装上下文 -> 调用模型（可多轮工具调用）-> 最终文本
//!
//! 模型以 `{"tool": "...", "args": {...}}`（可包在 ```json 代码块中）请求工具；
//! 工具失败作为 Observation 反馈给模型，不会中断阶段。模型调用失败（重试耗尽后）直接返回错误。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::Message;
use crate::pipeline::engine::InvocationContext;
use crate::pipeline::events::PipelineEvent;
use crate::pipeline::stage::StageDefinition;
use crate::pipeline::template::render;
use crate::tools::{ToolContext, ToolRegistry};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 工具调用次数用尽后追加的提示
const FINAL_ANSWER_PROMPT: &str =
    "You have used all available tool calls. Do not call any more tools; reply now with your final answer as plain text.";

/// 模型请求的工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 整条回复是一个 JSON 工具调用（裸 JSON 或单个 ```json 代码块）时返回 Some，否则视为普通回复
pub fn parse_tool_call(output: &str) -> Option<ToolCall> {
    let trimmed = output.trim();
    let candidate = if let Some(rest) = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```")) {
        rest.strip_suffix("```")?.trim()
    } else if trimmed.starts_with('{') && trimmed.ends_with('}') {
        trimmed
    } else {
        return None;
    };
    let call: ToolCall = serde_json::from_str(candidate).ok()?;
    if call.tool.trim().is_empty() {
        None
    } else {
        Some(call)
    }
}

/// 追加到 system 指令的工具说明
pub fn tool_instructions(registry: &ToolRegistry) -> String {
    let mut out = String::from("\n\nYou can use the following tools:\n");
    for (name, description) in registry.tool_descriptions() {
        out.push_str(&format!("- {}: {}\n", name, description));
    }
    out.push_str(&format!("\nTool schemas:\n{}\n", registry.to_schema_json()));
    out.push_str(
        "\nTo call a tool, reply with ONLY a JSON object of the form {\"tool\": \"<name>\", \"args\": {...}} and nothing else. \
         You will receive the result as an observation. When you have enough information, reply with your final answer as plain text.",
    );
    out
}

fn preview(s: &str) -> String {
    if s.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", s.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 运行一个阶段，返回其最终文本（尚未写入会话）
pub(crate) async fn run_stage(
    stage: &StageDefinition,
    ctx: &InvocationContext,
) -> Result<String, AgentError> {
    let session = ctx
        .sessions
        .get_session(&ctx.key.app_name, &ctx.key.user_id, &ctx.key.session_id)
        .await?;

    let mut system = render(stage.instruction(), &session.state, stage.name())?;

    let tool_ctx = ToolContext {
        app_name: ctx.key.app_name.clone(),
        user_id: ctx.key.user_id.clone(),
        session_id: ctx.key.session_id.clone(),
        stage: stage.name().to_string(),
        user_query: ctx.user_query.clone(),
    };

    let tools = stage.tools();
    let tools_enabled = tools.has_callable_tools();
    if tools_enabled {
        system.push_str(&tool_instructions(tools.registry()));
    }
    for section in tools.preprocess(&tool_ctx).await {
        system.push_str("\n\n");
        system.push_str(&section);
    }

    let mut messages = Vec::with_capacity(session.events.len() + 1);
    messages.push(Message::system(system));
    messages.extend(session.events.iter().map(|e| e.to_message_for(stage.name())));

    let mut tool_steps = 0usize;
    loop {
        tracing::debug!(stage = %stage.name(), messages = messages.len(), "calling model");
        let reply = stage.llm().complete(&messages).await?;

        let call = match parse_tool_call(&reply) {
            Some(call) if tools_enabled => call,
            _ => return Ok(reply),
        };

        if tool_steps >= stage.max_tool_steps() {
            tracing::warn!(stage = %stage.name(), steps = tool_steps, "tool call limit reached, asking for final answer");
            messages.push(Message::assistant(reply));
            messages.push(Message::user(FINAL_ANSWER_PROMPT));
            let last = stage.llm().complete(&messages).await?;
            // 工具调用 JSON 不能作为阶段输出流入下游指令
            if parse_tool_call(&last).is_some() {
                tracing::warn!(stage = %stage.name(), "model requested a tool after the final-answer prompt");
                return Err(AgentError::ToolLimitExceeded(stage.max_tool_steps()));
            }
            return Ok(last);
        }
        tool_steps += 1;

        ctx.emit(PipelineEvent::ToolCall {
            stage: stage.name().to_string(),
            tool: call.tool.clone(),
            args: call.args.clone(),
        });
        let observation = match tools.execute(&call.tool, call.args.clone(), &tool_ctx).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(stage = %stage.name(), tool = %call.tool, "tool failed: {}", e);
                format!("Error: {}", e)
            }
        };
        ctx.emit(PipelineEvent::Observation {
            stage: stage.name().to_string(),
            tool: call.tool.clone(),
            preview: preview(&observation),
        });

        messages.push(Message::assistant(reply));
        messages.push(Message::user(format!(
            "Observation from {}:\n{}",
            call.tool, observation
        )));
    }
}
