//! Mock LLM 客户端（无需 API，离线运行）
//!
//! 取 system 指令首行与最后一条 User 消息，拼成确定性的 Markdown 回复，便于本地跑通两阶段流水线。

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显角色与用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let role_line = messages
            .iter()
            .find(|m| m.role == Role::System)
            .and_then(|m| m.content.lines().map(str::trim).find(|l| !l.is_empty()))
            .unwrap_or("Assistant");
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!(
            "## Mock response\n{}\n\nRequest: {}",
            role_line, last_user
        ))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
