//! UI 状态投影
//!
//! UI 只持有轻量的 UiState（阶段、会话、对话记录、显示开关、锁、错误）；命令循环维护并通过 watch 通道发布。

use serde::Serialize;

use crate::advisor::{MENTOR_STAGE, RESEARCH_STAGE};
use crate::pipeline::TurnEvent;

/// 对话记录中的一项
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User { text: String },
    Stage(TurnEvent),
}

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: AgentPhase,
    pub session_id: String,
    pub transcript: Vec<TranscriptEntry>,
    pub show_research: bool,
    pub show_mentor: bool,
    pub input_locked: bool,
    pub error_message: Option<String>,
    /// 正在运行的阶段名
    pub active_stage: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new("default_session")
    }
}

impl UiState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            phase: AgentPhase::Idle,
            session_id: session_id.into(),
            transcript: Vec::new(),
            show_research: true,
            show_mentor: true,
            input_locked: false,
            error_message: None,
            active_stage: None,
        }
    }

    /// 按显示开关过滤后的记录；用户输入始终可见
    pub fn visible_transcript(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter().filter(move |entry| match entry {
            TranscriptEntry::User { .. } => true,
            TranscriptEntry::Stage(turn) => self.is_stage_visible(&turn.author),
        })
    }

    pub fn is_stage_visible(&self, stage: &str) -> bool {
        match stage {
            RESEARCH_STAGE => self.show_research,
            MENTOR_STAGE => self.show_mentor,
            _ => true,
        }
    }
}

/// Agent 阶段（UI 投影用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Idle,
    Running,
    ToolExecuting,
    Error,
}

impl AgentPhase {
    pub fn label(&self) -> &'static str {
        match self {
            AgentPhase::Idle => "Idle",
            AgentPhase::Running => "Running",
            AgentPhase::ToolExecuting => "Tool",
            AgentPhase::Error => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_hide_stage_output_only() {
        let mut state = UiState::new("s");
        state.transcript = vec![
            TranscriptEntry::User { text: "PM to DS".into() },
            TranscriptEntry::Stage(TurnEvent::new(RESEARCH_STAGE, "findings")),
            TranscriptEntry::Stage(TurnEvent::new(MENTOR_STAGE, "plan")),
        ];
        assert_eq!(state.visible_transcript().count(), 3);

        state.show_research = false;
        let visible: Vec<_> = state.visible_transcript().collect();
        assert_eq!(visible.len(), 2);
        assert!(matches!(visible[1], TranscriptEntry::Stage(t) if t.author == MENTOR_STAGE));

        state.show_mentor = false;
        assert_eq!(state.visible_transcript().count(), 1);
    }

    #[test]
    fn test_transcript_serializes_with_kind_tag() {
        let entry = TranscriptEntry::User { text: "hi".into() };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "user");
    }
}
