//! 流水线错误类型
//!
//! 模型服务失败（重试耗尽后）、会话解析失败、流水线构造错误、工具失败、记忆写入失败等。
//! 记忆写入失败只在钩子内部出现，由 Pipeline 捕获并记录，不会中断运行。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::MemoryError;
use crate::session::SessionError;

/// 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// create 与 get 均失败，不会启动运行
    #[error("Session resolution failed (create: {create}; get: {get})")]
    SessionResolution { create: String, get: String },

    /// 某阶段在重试耗尽后失败，整个运行中止
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("Pipeline has no stages")]
    EmptyPipeline,

    #[error("Duplicate output key '{key}' declared by stages '{first}' and '{second}'")]
    DuplicateOutputKey {
        key: String,
        first: String,
        second: String,
    },

    /// 模板引用了之前阶段没有声明的输出键
    #[error("Stage '{stage}' references unknown output key '{key}'")]
    UnknownTemplateKey { stage: String, key: String },

    #[error("No value for '{key}' when rendering stage '{stage}'")]
    MissingTemplateValue { stage: String, key: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 工具调用次数用尽后模型仍然只返回工具调用
    #[error("Tool call limit ({0}) reached and the model still requested a tool")]
    ToolLimitExceeded(usize),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 包装为某阶段的失败；已经是 StageFailed 的错误保持不变
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            AgentError::StageFailed { .. } => self,
            other => AgentError::StageFailed {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// 失败所在阶段名（如有）
    pub fn stage(&self) -> Option<&str> {
        match self {
            AgentError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = AgentError::Llm(LlmError::Timeout).in_stage("research_agent");
        assert_eq!(err.stage(), Some("research_agent"));
        let err = err.in_stage("mentor_agent");
        assert_eq!(err.stage(), Some("research_agent"));
    }

    #[test]
    fn test_display_includes_source() {
        let err = AgentError::Llm(LlmError::Api {
            status: Some(503),
            message: "unavailable".into(),
        })
        .in_stage("research_agent");
        let text = err.to_string();
        assert!(text.contains("research_agent"));
        assert!(text.contains("503"));
    }
}
