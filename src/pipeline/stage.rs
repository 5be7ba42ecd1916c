//! 阶段定义
//!
//! 一个阶段 = 名称 + 指令模板 + 工具 + 输出键 + 可选的阶段后钩子 + 所用模型。
//! 构建后不可变；由 StageBuilder 以流式 API 构造。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::pipeline::template::{placeholders, Placeholder};
use crate::session::Session;
use crate::tools::{Tool, ToolExecutor, ToolRegistry};

/// 默认单阶段最多工具调用次数
pub const DEFAULT_MAX_TOOL_STEPS: usize = 4;

/// 阶段后钩子：阶段输出落定后、下一阶段开始前调用
///
/// 返回的错误由 Pipeline 捕获并记录，不会中断运行。
#[async_trait]
pub trait StageHook: Send + Sync {
    async fn after_stage(&self, stage_name: &str, session: &Session) -> Result<(), AgentError>;
}

/// 不可变的阶段定义
pub struct StageDefinition {
    name: String,
    instruction: String,
    output_key: String,
    tools: ToolExecutor,
    after_stage: Option<Arc<dyn StageHook>>,
    llm: Arc<dyn LlmClient>,
    max_tool_steps: usize,
}

impl StageDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    pub fn after_stage(&self) -> Option<&Arc<dyn StageHook>> {
        self.after_stage.as_ref()
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn max_tool_steps(&self) -> usize {
        self.max_tool_steps
    }

    /// 指令模板中的占位符
    pub fn placeholders(&self) -> Vec<Placeholder> {
        placeholders(&self.instruction)
    }
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("output_key", &self.output_key)
            .field("tools", &self.tools.tool_names())
            .field("has_after_stage", &self.after_stage.is_some())
            .field("model", &self.llm.model_name())
            .finish()
    }
}

/// 阶段构建器
pub struct StageBuilder {
    name: String,
    instruction: String,
    output_key: Option<String>,
    registry: ToolRegistry,
    tool_timeout_secs: u64,
    after_stage: Option<Arc<dyn StageHook>>,
    max_tool_steps: usize,
}

impl StageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: String::new(),
            output_key: None,
            registry: ToolRegistry::new(),
            tool_timeout_secs: 30,
            after_stage: None,
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
        }
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// 输出键；未设置时使用阶段名
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.registry.register_arc(tool);
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn after_stage(mut self, hook: Arc<dyn StageHook>) -> Self {
        self.after_stage = Some(hook);
        self
    }

    pub fn max_tool_steps(mut self, steps: usize) -> Self {
        self.max_tool_steps = steps;
        self
    }

    /// 绑定模型并构建
    pub fn build(self, llm: Arc<dyn LlmClient>) -> Result<StageDefinition, AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("stage name is required".to_string()));
        }
        if self.instruction.trim().is_empty() {
            return Err(AgentError::Config(format!(
                "stage '{}' has an empty instruction",
                self.name
            )));
        }
        let output_key = self.output_key.unwrap_or_else(|| self.name.clone());
        Ok(StageDefinition {
            name: self.name,
            instruction: self.instruction,
            output_key,
            tools: ToolExecutor::new(self.registry, self.tool_timeout_secs),
            after_stage: self.after_stage,
            llm,
            max_tool_steps: self.max_tool_steps,
        })
    }
}
