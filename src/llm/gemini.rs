//! Gemini API 客户端（OpenAI 兼容格式）
//!
//! Gemini 提供 OpenAI 兼容的 chat completions 端点。
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai/
//! - 模型: gemini-2.5-flash-lite (默认，响应快), gemini-2.5-flash

use crate::llm::OpenAiClient;

/// Gemini API 常量
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const GEMINI_FLASH_LITE: &str = "gemini-2.5-flash-lite";
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

/// 读取 Gemini API Key：`GEMINI_API_KEY` 优先，其次 `GOOGLE_API_KEY`
pub fn gemini_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// 创建 Gemini 客户端
///
/// - API Key 取自 `GEMINI_API_KEY` / `GOOGLE_API_KEY`
/// - 模型可通过 `model` 参数或 `GEMINI_MODEL` 环境变量指定，默认 gemini-2.5-flash-lite
pub fn create_gemini_client(model: Option<&str>, base_url: Option<&str>) -> OpenAiClient {
    let api_key = gemini_api_key().unwrap_or_else(|| "placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("GEMINI_MODEL").ok())
        .unwrap_or_else(|| GEMINI_FLASH_LITE.to_string());

    OpenAiClient::new(
        Some(base_url.unwrap_or(GEMINI_BASE_URL)),
        &model,
        Some(api_key.as_str()),
    )
}
