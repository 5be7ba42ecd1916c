//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）与重试装饰器

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::Arc;

pub use gemini::{create_gemini_client, gemini_api_key, GEMINI_FLASH, GEMINI_FLASH_LITE};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{LlmClient, LlmError};

use crate::config::AppConfig;
use crate::core::AgentError;

/// 根据配置与环境变量选择 LLM 后端（Gemini / OpenAI 兼容 / Mock），并套上重试策略
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let retry = cfg.retry.to_retry_config();
    let provider = cfg.llm.provider.to_lowercase();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "mock" {
        tracing::info!("Using Mock LLM (provider = mock)");
        return Ok(Arc::new(RetryingLlmClient::new(MockLlmClient, retry)?));
    }

    if gemini_api_key().is_some() && provider != "openai" {
        tracing::info!("Using Gemini LLM ({})", cfg.llm.model);
        let client = create_gemini_client(Some(&cfg.llm.model), cfg.llm.base_url.as_deref())
            .with_request_timeout(cfg.llm.timeouts.request);
        Ok(Arc::new(RetryingLlmClient::new(client, retry)?))
    } else if has_openai_key {
        let model = if cfg.llm.model.starts_with("gemini") {
            "gpt-4o-mini".to_string()
        } else {
            cfg.llm.model.clone()
        };
        tracing::info!("Using OpenAI LLM ({})", model);
        let client = OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, None)
            .with_request_timeout(cfg.llm.timeouts.request);
        Ok(Arc::new(RetryingLlmClient::new(client, retry)?))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Ok(Arc::new(RetryingLlmClient::new(MockLlmClient, retry)?))
    }
}
