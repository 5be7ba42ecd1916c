//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；Gemini、OpenAI、自建代理均走这里。
//! 失败时尽量保留 HTTP 状态码，交给 RetryingLlmClient 判断是否重试。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use regex::Regex;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
struct TokenUsage {
    prompt_tokens: Arc<AtomicU64>,
    completion_tokens: Arc<AtomicU64>,
    total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    fn new() -> Self {
        Self::default()
    }

    fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    /// 累计 token 使用统计
    usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| LlmError::InvalidResponse(e.to_string()))
            })
            .collect()
    }
}

/// 将 async_openai 的错误映射为 LlmError，保留 HTTP 状态码
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                LlmError::Timeout
            } else if let Some(status) = e.status() {
                LlmError::status(status.as_u16(), e.to_string())
            } else {
                LlmError::Network(e.to_string())
            }
        }
        OpenAIError::ApiError(api_error) => LlmError::Api {
            status: status_from_api_error(&api_error),
            message: api_error.to_string(),
        },
        other => {
            let message = other.to_string();
            LlmError::Api {
                status: status_from_message(&message),
                message,
            }
        }
    }
}

/// 错误体里的 code / type 对应的状态码（OpenAI 与 Gemini 兼容端点的常见取值）
fn status_from_error_kind(kind: &str) -> Option<u16> {
    match kind {
        "rate_limit_exceeded" | "rate_limit_error" | "RESOURCE_EXHAUSTED" => Some(429),
        "server_error" | "internal_error" | "api_error" | "INTERNAL" => Some(500),
        "overloaded_error" | "service_unavailable" | "UNAVAILABLE" => Some(503),
        "timeout" | "DEADLINE_EXCEEDED" => Some(504),
        _ => None,
    }
}

/// API 错误体不带 HTTP 状态码：先看结构化的 code / type，再在文本中找独立的状态码
fn status_from_api_error(api_error: &ApiError) -> Option<u16> {
    api_error
        .code
        .as_deref()
        .and_then(status_from_error_kind)
        .or_else(|| api_error.r#type.as_deref().and_then(status_from_error_kind))
        .or_else(|| status_from_message(&api_error.message))
}

fn status_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // 整词匹配："150000"、"5000" 之类的数字不算
        Regex::new(r"\b(429|500|502|503|504)\b")
            .unwrap_or_else(|e| panic!("invalid status regex: {e}"))
    })
}

/// 从错误文本识别状态码：只匹配独立的状态码数字
fn status_from_message(message: &str) -> Option<u16> {
    status_number_regex()
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::RetryConfig;

    fn api_error(message: &str, r#type: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: r#type.map(String::from),
            param: None,
            code: code.map(String::from),
        })
    }

    #[test]
    fn test_status_from_structured_error_fields() {
        let err = map_openai_error(api_error("Rate limit reached", Some("requests"), Some("rate_limit_exceeded")));
        assert_eq!(err.status_code(), Some(429));
        let err = map_openai_error(api_error("quota", None, Some("RESOURCE_EXHAUSTED")));
        assert_eq!(err.status_code(), Some(429));
        let err = map_openai_error(api_error("The server had an error", Some("server_error"), None));
        assert_eq!(err.status_code(), Some(500));
        let err = map_openai_error(api_error("Incorrect API key provided", Some("invalid_request_error"), Some("invalid_api_key")));
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_numbers_inside_client_errors_are_not_status_codes() {
        let context_length = "This model's maximum context length is 128000 tokens. However, your messages resulted in 150000 tokens.";
        let max_tokens = "Invalid 'max_tokens': integer above maximum value. Expected a value <= 4096, but got 5000 instead.";
        let internal_field = "Invalid value for 'internal_id'";
        for message in [context_length, max_tokens, internal_field] {
            assert_eq!(status_from_message(message), None, "{message}");
            let err = map_openai_error(api_error(message, Some("invalid_request_error"), Some("context_length_exceeded")));
            assert_eq!(err.status_code(), None, "{message}");
            assert!(!RetryConfig::default().is_retryable(&err));
        }
    }

    #[test]
    fn test_status_from_message_whole_numbers() {
        assert_eq!(status_from_message("upstream returned 503 Service Unavailable"), Some(503));
        assert_eq!(status_from_message("status: 429"), Some(429));
        assert_eq!(status_from_message("error 500"), Some(500));
        assert_eq!(status_from_message("The model is overloaded"), None);
        assert_eq!(status_from_message("Invalid API key"), None);
    }

    #[test]
    fn test_message_conversion_preserves_order() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", Some("sk-test"));
        let converted = client
            .to_openai_messages(&[
                Message::system("sys"),
                Message::user("hi"),
                Message::assistant("hello"),
            ])
            .unwrap();
        assert_eq!(converted.len(), 3);
        assert!(matches!(converted[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(converted[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(converted[2], ChatCompletionRequestMessage::Assistant(_)));
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }
}
