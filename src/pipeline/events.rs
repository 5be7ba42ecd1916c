//! 流水线事件与状态
//!
//! TurnEvent 是一条带阶段名的输出；PipelineEvent 用于流式展示（阶段开始、工具调用、输出、钩子失败、结束）；
//! PipelineState 描述一次运行的状态机：NotStarted → Running(i) → Completed，或 Running(i) → Failed(i)。

use serde::{Deserialize, Serialize};

/// 模型用来表示「无内容」的占位文本
pub const PLACEHOLDER_TEXT: &str = "None";

/// 一条阶段输出（阶段名 + 文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub author: String,
    pub text: String,
}

impl TurnEvent {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }

    /// 空串与 "None" 不展示，其余内容原样保留
    pub fn is_displayable(&self) -> bool {
        !self.text.is_empty() && self.text != PLACEHOLDER_TEXT
    }
}

/// 运行过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 第 index 个阶段开始（从 0 计）
    StageStarted { stage: String, index: usize, total: usize },
    /// 阶段调用工具
    ToolCall { stage: String, tool: String, args: serde_json::Value },
    /// 工具返回（预览）
    Observation { stage: String, tool: String, preview: String },
    /// 阶段最终输出
    StageOutput(TurnEvent),
    /// 阶段后钩子失败（已忽略）
    HookFailed { stage: String, reason: String },
    Completed,
    Failed { stage: String, error: String },
}

/// 一次运行的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Running { stage_index: usize },
    Completed,
    Failed { stage_index: usize },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed { .. })
    }

    /// 进入第 index 个阶段：只能从 NotStarted 进入 0，或从 Running(index-1) 前进
    pub fn start_stage(self, index: usize) -> Option<Self> {
        match self {
            PipelineState::NotStarted if index == 0 => Some(PipelineState::Running { stage_index: 0 }),
            PipelineState::Running { stage_index } if stage_index + 1 == index => {
                Some(PipelineState::Running { stage_index: index })
            }
            _ => None,
        }
    }

    pub fn complete(self) -> Option<Self> {
        match self {
            PipelineState::Running { .. } => Some(PipelineState::Completed),
            _ => None,
        }
    }

    pub fn fail(self) -> Option<Self> {
        match self {
            PipelineState::Running { stage_index } => Some(PipelineState::Failed { stage_index }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_displayable_filter() {
        assert!(!TurnEvent::new("a", "").is_displayable());
        assert!(!TurnEvent::new("a", "None").is_displayable());
        assert!(TurnEvent::new("a", "none").is_displayable());
        assert!(TurnEvent::new("a", " None ").is_displayable());
        assert!(TurnEvent::new("a", "## Plan").is_displayable());
    }

    #[test]
    fn test_state_transitions() {
        let s = PipelineState::NotStarted;
        assert!(s.start_stage(1).is_none());
        assert!(s.complete().is_none());
        let s = s.start_stage(0).unwrap();
        assert!(s.start_stage(2).is_none());
        let s = s.start_stage(1).unwrap();
        assert_eq!(s, PipelineState::Running { stage_index: 1 });
        assert_eq!(s.fail(), Some(PipelineState::Failed { stage_index: 1 }));
        let done = s.complete().unwrap();
        assert!(done.is_terminal());
        assert!(done.start_stage(0).is_none());
        assert!(done.fail().is_none());
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(PipelineEvent::HookFailed {
            stage: "research_agent".into(),
            reason: "disk full".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "hook_failed");
        assert_eq!(json["stage"], "research_agent");
    }
}
