//! 重试策略：对模型服务的瞬时失败做指数退避重试
//!
//! delay(n) = initial_delay * exp_base^(n-1)，n 为第几次重试。只有状态码在 http_status_codes 中的失败才重试；
//! 其余失败在第一次尝试后直接返回，重试耗尽时原样返回最后一次失败。

use std::time::Duration;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 重试配置（attempts 为总尝试次数，含首次）
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub attempts: u32,
    pub exp_base: f64,
    pub initial_delay: Duration,
    pub http_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            exp_base: 7.0,
            initial_delay: Duration::from_secs(1),
            http_status_codes: vec![429, 500, 503, 504],
        }
    }
}

impl RetryConfig {
    /// 不重试：只尝试一次
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            http_status_codes: Vec::new(),
            ..Self::default()
        }
    }

    /// 校验不变量：attempts ≥ 1；exp_base > 1；attempts > 1 时状态码集合非空
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.attempts < 1 {
            return Err(AgentError::Config("retry.attempts must be >= 1".into()));
        }
        if !(self.exp_base > 1.0) || !self.exp_base.is_finite() {
            return Err(AgentError::Config(format!(
                "retry.exp_base must be a finite number > 1, got {}",
                self.exp_base
            )));
        }
        if self.attempts > 1 && self.http_status_codes.is_empty() {
            return Err(AgentError::Config(
                "retry.http_status_codes must not be empty when attempts > 1".into(),
            ));
        }
        Ok(())
    }

    /// 第 retry 次重试前的等待时间（retry 从 1 开始）
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let factor = self.exp_base.powi(exp);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs < Duration::MAX.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            Duration::MAX
        }
    }

    pub fn is_retryable(&self, err: &LlmError) -> bool {
        err.status_code()
            .map(|code| self.http_status_codes.contains(&code))
            .unwrap_or(false)
    }
}

/// 带重试的 LLM 客户端装饰器
pub struct RetryingLlmClient<C> {
    inner: C,
    config: RetryConfig,
}

impl<C: LlmClient> RetryingLlmClient<C> {
    pub fn new(inner: C, config: RetryConfig) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingLlmClient<C> {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.config.attempts && self.config.is_retryable(&e) => {
                    let delay = self.config.delay_for(attempt);
                    tracing::warn!(
                        model = %self.inner.model_name(),
                        attempt,
                        status = ?e.status_code(),
                        delay_ms = delay.as_millis() as u64,
                        "LLM call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::error!(attempts = attempt, "LLM call failed after retries: {}", e);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
