//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Gemini / Mock）实现 LlmClient：complete 返回完整回复。
//! 失败统一为 LlmError，携带可选的 HTTP 状态码，供重试策略判断。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型服务错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 带状态码的 API 错误
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        LlmError::Api {
            status: Some(status),
            message: message.into(),
        }
    }

    /// HTTP 状态码（如有）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => *status,
            _ => None,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 模型名（用于日志）
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
