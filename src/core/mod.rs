//! 核心层：错误类型、UI 状态投影、Advisor 组装与命令循环

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{create_advisor, create_advisor_with_llm, create_agent, spawn_command_loop, Advisor, Command};
pub use state::{AgentPhase, TranscriptEntry, UiState};
