//! 流水线：阶段定义、指令模板、单阶段执行（含工具循环）与顺序编排

pub mod engine;
pub mod events;
pub mod executor;
pub mod stage;
pub mod template;

pub use engine::{InvocationContext, Pipeline, PipelineOutcome};
pub use events::{PipelineEvent, PipelineState, TurnEvent, PLACEHOLDER_TEXT};
pub use executor::{parse_tool_call, ToolCall};
pub use stage::{StageBuilder, StageDefinition, StageHook, DEFAULT_MAX_TOOL_STEPS};
pub use template::{placeholders, render, Placeholder};
